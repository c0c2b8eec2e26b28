use super::llm_output::parse_object_reply;
use super::oracle::Oracle;
use super::request_context::RequestContext;
use crate::domain::intent::OperationIntent;
use crate::domain::outcome::{QueryOutcome, ResultPresentation};

pub const DEFAULT_SAMPLE_ROWS: usize = 5;

fn build_system_prompt(
    user_input: &str,
    intent: &OperationIntent,
    sql: &str,
    total_rows: usize,
    sample_json: &str,
) -> String {
    let description = if intent.description.is_empty() {
        "not provided"
    } else {
        intent.description.as_str()
    };

    format!(
        r#"You are a data analyst who presents SQL query results in a user-friendly way.

<user_question>
{user_input}
</user_question>

<query_intent>
{description}
</query_intent>

<executed_sql>
{sql}
</executed_sql>

<result_sample>
Sample rows ({total} records in total):
{sample}
</result_sample>

<task>
1. Table display: give readable display names for the result columns
2. Summary: explain the result briefly in Markdown
</task>

<output_format>
Return one JSON object:
```json
{{
  "table_display": {{
    "columns": {{"<original column>": "<display name>"}},
    "description": "<short description of the table>"
  }},
  "summary": "<markdown summary>"
}}
```
</output_format>

<rules>
1. The JSON must be strictly valid
2. The column mapping must cover every original column
3. Display names should be short, clear and meaningful
4. Answer the summary in the user's language, using Markdown, with the key findings
5. If only a sample was provided, say so in the summary
</rules>"#,
        user_input = user_input,
        description = description,
        sql = sql,
        total = total_rows,
        sample = sample_json
    )
}

/// Best-effort display annotation for non-empty row sets.
pub struct ResultSummarizer {
    oracle: Oracle,
    sample_rows: usize,
}

impl ResultSummarizer {
    pub fn new(oracle: Oracle, sample_rows: usize) -> Self {
        Self {
            oracle,
            sample_rows: sample_rows.max(1),
        }
    }

    /// Never fails: any problem yields [`ResultPresentation::neutral`].
    pub async fn summarize(
        &self,
        ctx: &RequestContext,
        user_input: &str,
        sql: &str,
        intent: &OperationIntent,
        outcome: &QueryOutcome,
    ) -> ResultPresentation {
        let (results, total_rows) = match outcome {
            QueryOutcome::Query {
                results, row_count, ..
            } => (results, *row_count),
            _ => return ResultPresentation::neutral(0),
        };

        let sample = &results[..results.len().min(self.sample_rows)];
        let sample_json = match serde_json::to_string(sample) {
            Ok(json) => json,
            Err(e) => {
                ctx.error(&format!("Failed to serialize result sample: {}", e));
                return ResultPresentation::neutral(total_rows);
            }
        };

        let system_prompt = build_system_prompt(user_input, intent, sql, total_rows, &sample_json);
        let prompt = format!(
            "Analyse and present this query result: {} records",
            total_rows
        );

        let reply = match self.oracle.invoke(&prompt, &system_prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                ctx.error(&format!("Result summarization failed: {}", e));
                return ResultPresentation::neutral(total_rows);
            }
        };

        match parse_object_reply::<ResultPresentation>(&reply.response) {
            Ok(presentation) => {
                ctx.info("Result presentation optimized");
                presentation
            }
            Err(e) => {
                ctx.warn(&format!(
                    "Could not read result presentation, using default: {}",
                    e
                ));
                ResultPresentation::neutral(total_rows)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::{context, ScriptedLlm};
    use crate::domain::error::AppError;
    use crate::domain::intent::OperationKind;
    use crate::domain::llm_config::LLMConfig;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;

    fn outcome(rows: usize) -> QueryOutcome {
        let results: Vec<Map<String, Value>> = (0..rows)
            .map(|i| {
                let mut row = Map::new();
                row.insert("金额".to_string(), json!(i));
                row
            })
            .collect();
        QueryOutcome::Query {
            row_count: results.len(),
            results,
            columns: vec!["金额".to_string()],
            formatted_view: None,
        }
    }

    fn intent() -> OperationIntent {
        OperationIntent::actionable(OperationKind::Query, "order amounts", "raw")
    }

    #[tokio::test]
    async fn test_summary_parsed_and_sample_capped() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "```json\n{\"table_display\": {\"columns\": {\"金额\": \"Amount\"}, \"description\": \"Orders\"}, \"summary\": \"**8** orders\"}\n```",
        ]));
        let summarizer = ResultSummarizer::new(Oracle::new(llm.clone(), LLMConfig::default()), 5);
        let (ctx, _rx) = context();

        let presentation = summarizer
            .summarize(&ctx, "amounts?", "SELECT amount FROM orders", &intent(), &outcome(8))
            .await;

        assert_eq!(presentation.table_display.columns["金额"], "Amount");
        assert_eq!(presentation.summary, "**8** orders");

        let system = &llm.calls()[0].system;
        assert!(system.contains("(8 records in total)"));
        assert!(system.contains(r#"{"金额":4}"#));
        assert!(!system.contains(r#"{"金额":5}"#));
    }

    #[tokio::test]
    async fn test_unparsable_summary_is_neutral() {
        let llm = Arc::new(ScriptedLlm::new(vec!["Here is a nice table for you."]));
        let summarizer = ResultSummarizer::new(Oracle::new(llm, LLMConfig::default()), 5);
        let (ctx, _rx) = context();

        let presentation = summarizer
            .summarize(&ctx, "amounts?", "SELECT amount FROM orders", &intent(), &outcome(3))
            .await;
        assert_eq!(presentation, ResultPresentation::neutral(3));
        assert!(presentation.table_display.columns.is_empty());
        assert_eq!(presentation.summary, "The query returned 3 rows.");
    }

    #[tokio::test]
    async fn test_oracle_failure_is_neutral() {
        let llm = Arc::new(ScriptedLlm::with_results(vec![Err(AppError::LLMError(
            "timeout".to_string(),
        ))]));
        let summarizer = ResultSummarizer::new(Oracle::new(llm, LLMConfig::default()), 5);
        let (ctx, _rx) = context();

        let presentation = summarizer
            .summarize(&ctx, "amounts?", "SELECT amount FROM orders", &intent(), &outcome(2))
            .await;
        assert_eq!(presentation, ResultPresentation::neutral(2));
    }
}
