//! Intent classification.
//!
//! One oracle call decides whether the user wants a data operation. The
//! model marks actionable requests with a fenced block tagged by the
//! operation (```` ```query ````, ```` ```insert ````, ...); anything else is
//! a conversational answer.

use super::llm_output::{extract_block, tagged_block_pattern};
use super::oracle::{today, Oracle};
use super::request_context::{preview, RequestContext};
use super::schema_formatter::format_table_summary;
use crate::domain::error::Result;
use crate::domain::intent::{OperationIntent, OperationKind};
use crate::domain::schema::SchemaSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;

// Every accepted tag, in classification priority order.
static TAG_PATTERNS: Lazy<Vec<(OperationKind, Regex)>> = Lazy::new(|| {
    OperationKind::CLASSIFICATION_PRIORITY
        .iter()
        .flat_map(|kind| {
            kind.tags()
                .iter()
                .map(move |tag| (*kind, tagged_block_pattern(tag).unwrap()))
        })
        .collect()
});

fn build_system_prompt(table_summary: &str) -> String {
    format!(
        r#"You are a professional database assistant. You understand what the user wants and help them operate on the database.

<task>
Analyse the user's message, decide whether they want a database operation, and identify its type precisely.
</task>

{tables}
<capabilities>
1. Map natural-language requests to database operations
2. Recognise four operation types: query, insert, update, delete
3. Turn loose wording into a precise operation description
</capabilities>

<output_format>
When the user wants a database operation, answer briefly and add exactly one fenced block:
- query:  ```query\n<what the user wants to read>\n```
- insert: ```insert\n<what the user wants to add>\n```
- update: ```update\n<what the user wants to change>\n```
- delete: ```delete\n<what the user wants to remove>\n```
</output_format>

<rules>
1. Never write SQL here, only describe the operation
2. Descriptions must be specific: subject, conditions and target
3. If the intent is unclear or not about the database, reply normally without any of the blocks above
4. Markdown is allowed
5. Keep descriptions short and professional
6. Prefer table names that exist in the list above
7. Today's date is {today}
</rules>

<examples>
User: "show every employee earning more than 5000"
Reply: I can look up employees with a salary above 5000.

```query
List all employees whose salary is greater than 5000
```

User: "add a new employee Zhang San to marketing with salary 8000"
Reply: I'll add the new employee.

```insert
Add employee Zhang San to the marketing department with salary 8000
```
</examples>"#,
        tables = table_summary,
        today = today()
    )
}

/// First tag, in priority order, whose fenced block is present.
pub fn parse_intent(response: &str) -> OperationIntent {
    for (kind, pattern) in TAG_PATTERNS.iter() {
        if let Some(description) = extract_block(pattern, response) {
            return OperationIntent::actionable(*kind, description, response);
        }
    }
    OperationIntent::conversational(response)
}

pub struct IntentClassifier {
    oracle: Oracle,
}

impl IntentClassifier {
    pub fn new(oracle: Oracle) -> Self {
        Self { oracle }
    }

    pub async fn classify(
        &self,
        ctx: &RequestContext,
        user_input: &str,
        schema: &SchemaSnapshot,
    ) -> Result<OperationIntent> {
        let system_prompt = build_system_prompt(&format_table_summary(schema));
        let reply = self.oracle.invoke(user_input, &system_prompt).await?;

        let intent = parse_intent(&reply.response);
        match intent.kind {
            Some(kind) => ctx.info(&format!(
                "Detected {} operation: {}",
                kind,
                preview(&intent.description, 100)
            )),
            None => ctx.debug("No data operation detected, replying conversationally"),
        }
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::{context, orders_schema, ScriptedLlm};
    use crate::domain::llm_config::LLMConfig;
    use std::sync::Arc;

    #[test]
    fn test_parse_each_tag() {
        let intent = parse_intent("Sure.\n```update\nset amount to 0 for order 3\n```");
        assert_eq!(intent.kind, Some(OperationKind::Update));
        assert_eq!(intent.description, "set amount to 0 for order 3");

        let intent = parse_intent("```删除\n删除订单3\n```");
        assert_eq!(intent.kind, Some(OperationKind::Delete));
        assert_eq!(intent.description, "删除订单3");
    }

    #[test]
    fn test_priority_insert_before_query() {
        let response = "```query\nlist orders\n```\n```insert\nadd an order\n```";
        let intent = parse_intent(response);
        assert_eq!(intent.kind, Some(OperationKind::Insert));
        assert_eq!(intent.description, "add an order");
        assert_eq!(intent.raw_response, response);
    }

    #[test]
    fn test_conversational_reply() {
        let response = "Hello! Ask me anything about your data.";
        let intent = parse_intent(response);
        assert!(!intent.is_actionable());
        assert_eq!(intent.raw_response, response);
    }

    #[tokio::test]
    async fn test_classify_puts_tables_in_prompt() {
        let llm = Arc::new(ScriptedLlm::new(vec!["```query\nall order amounts\n```"]));
        let classifier = IntentClassifier::new(Oracle::new(llm.clone(), LLMConfig::default()));
        let (ctx, _rx) = context();

        let intent = classifier
            .classify(&ctx, "how much were my orders", &orders_schema())
            .await
            .unwrap();

        assert_eq!(intent.kind, Some(OperationKind::Query));
        let calls = llm.calls();
        assert_eq!(calls[0].user, "how much were my orders");
        assert!(calls[0].system.contains("- orders: 订单表"));
        assert!(calls[0].system.contains(&today()));
    }
}
