use super::llm_output::extract_sql_block;
use super::oracle::{today, Oracle};
use super::relevance_scorer::RelevanceScorer;
use super::request_context::{preview, RequestContext};
use super::schema_formatter::format_schema_markdown;
use crate::domain::error::Result;
use crate::domain::intent::{OperationIntent, SqlCandidate};
use crate::domain::schema::SchemaSnapshot;

fn build_system_prompt(
    schema_markdown: &str,
    relevant_tables: &str,
    intent: &OperationIntent,
    dialect: &str,
) -> String {
    let verb_hint = intent
        .kind
        .map(|kind| format!("Use a {} statement.", kind.sql_verb()))
        .unwrap_or_default();

    format!(
        r#"You are a precise SQL generation expert. You write high-quality SQL from a request and the database structure.

<database_structure>
{schema}
</database_structure>

<relevant_tables>
Based on the operation description, these tables are likely involved:
{relevant}
</relevant_tables>

<operation>
Type: {kind}
Description: {description}
</operation>

<rules>
1. Output only the SQL statement, no explanation or comments
2. Wrap it in a markdown block that starts with ```sql and ends with ```
3. The statement must be complete, valid and directly executable on {dialect}
4. Never use tables or columns that do not exist
5. Query -> SELECT, insert -> INSERT INTO, update -> UPDATE, delete -> DELETE. {verb_hint}
6. Use WHERE clauses to keep the operation safe
7. For queries select the needed columns instead of *
8. Prefer the tables listed under relevant_tables
9. Today's date is {today}
</rules>

<output_format>
```sql
your SQL statement
```
</output_format>"#,
        schema = schema_markdown,
        relevant = relevant_tables,
        kind = intent.kind_label(),
        description = intent.description,
        dialect = dialect,
        verb_hint = verb_hint,
        today = today()
    )
}

pub struct SqlGenerator {
    oracle: Oracle,
    scorer: RelevanceScorer,
}

impl SqlGenerator {
    pub fn new(oracle: Oracle, scorer: RelevanceScorer) -> Self {
        Self { oracle, scorer }
    }

    /// One generation attempt. A response without a fenced `sql` block
    /// yields a candidate with `sql: None`.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        intent: &OperationIntent,
        schema: &SchemaSnapshot,
        dialect: &str,
    ) -> Result<SqlCandidate> {
        let ranking = self.scorer.rank(&intent.description, intent.kind, schema);
        ctx.debug(&format!(
            "Relevant tables for '{}': {:?}",
            preview(&intent.description, 50),
            ranking.table_names()
        ));

        let system_prompt = build_system_prompt(
            &format_schema_markdown(schema),
            &ranking.render(),
            intent,
            dialect,
        );
        let user_prompt = format!(
            "Generate the SQL statement for this operation: {} - {}",
            intent.kind_label(),
            intent.description
        );

        let reply = self.oracle.invoke(&user_prompt, &system_prompt).await?;
        let sql = extract_sql_block(&reply.response);
        match &sql {
            Some(sql) => ctx.info(&format!("Generated SQL: {}", preview(sql, 50))),
            None => ctx.warn("Generator response contained no sql block"),
        }

        Ok(SqlCandidate {
            sql,
            source_response: reply.response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::{context, orders_schema, ScriptedLlm};
    use crate::domain::intent::OperationKind;
    use crate::domain::llm_config::LLMConfig;
    use std::sync::Arc;

    fn generator(llm: Arc<ScriptedLlm>) -> SqlGenerator {
        SqlGenerator::new(
            Oracle::new(llm, LLMConfig::default()),
            RelevanceScorer::default(),
        )
    }

    #[tokio::test]
    async fn test_generate_extracts_first_sql_block() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "```sql\nSELECT amount FROM orders;\n```\n```sql\nSELECT 2;\n```",
        ]));
        let (ctx, _rx) = context();
        let intent = OperationIntent::actionable(OperationKind::Query, "amount of orders", "raw");

        let candidate = generator(llm.clone())
            .generate(&ctx, &intent, &orders_schema(), "postgres")
            .await
            .unwrap();

        assert_eq!(candidate.sql.as_deref(), Some("SELECT amount FROM orders;"));
        let system = &llm.calls()[0].system;
        assert!(system.contains("| amount | numeric | 金额 |"));
        assert!(system.contains("- **orders** (订单表)"));
        assert!(system.contains("Description: amount of orders"));
        assert_eq!(
            llm.calls()[0].user,
            "Generate the SQL statement for this operation: query - amount of orders"
        );
    }

    #[tokio::test]
    async fn test_generate_without_block() {
        let llm = Arc::new(ScriptedLlm::new(vec!["I cannot help with that."]));
        let (ctx, _rx) = context();
        let intent = OperationIntent::actionable(OperationKind::Delete, "everything", "raw");

        let candidate = generator(llm)
            .generate(&ctx, &intent, &orders_schema(), "sqlite")
            .await
            .unwrap();

        assert!(candidate.sql.is_none());
        assert_eq!(candidate.source_response, "I cannot help with that.");
    }
}
