//! SQL audit.
//!
//! The auditor asks the oracle whether a candidate statement matches the
//! user's request and the live schema. An answer that cannot be read is
//! reported as [`AuditOutcome::Indeterminate`], which the pipeline treats as
//! accepted. Oracle transport errors still propagate.

use super::llm_output::parse_json_reply;
use super::oracle::{today, Oracle};
use super::request_context::{preview, RequestContext};
use super::schema_formatter::format_schema_markdown;
use crate::domain::error::Result;
use crate::domain::intent::{AuditOutcome, AuditVerdict, OperationIntent, OperationKind};
use crate::domain::schema::SchemaSnapshot;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct AuditReply {
    #[serde(default)]
    is_valid: Option<bool>,
    #[serde(default)]
    issues: Vec<Value>,
    #[serde(default)]
    suggested_operation_type: Option<String>,
    #[serde(default)]
    suggested_description: Option<String>,
}

impl AuditReply {
    fn into_verdict(self, current: &OperationIntent) -> AuditVerdict {
        let issues = self
            .issues
            .into_iter()
            .map(|issue| match issue {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect();

        let suggested_kind = self
            .suggested_operation_type
            .as_deref()
            .and_then(OperationKind::parse)
            .or(current.kind)
            .unwrap_or(OperationKind::Query);

        let suggested_description = self
            .suggested_description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| current.description.clone());

        AuditVerdict {
            is_valid: self.is_valid.unwrap_or(false),
            issues,
            suggested_kind,
            suggested_description,
        }
    }
}

/// Read an auditor answer. Anything that does not parse as the audit object
/// is `Indeterminate`.
pub fn parse_audit_response(response: &str, current: &OperationIntent) -> AuditOutcome {
    match parse_json_reply::<AuditReply>(response) {
        Ok(reply) => AuditOutcome::Verdict(reply.into_verdict(current)),
        Err(e) => AuditOutcome::Indeterminate {
            reason: e.to_string(),
        },
    }
}

fn build_system_prompt(
    schema_markdown: &str,
    user_input: &str,
    intent: &OperationIntent,
    sql: &str,
) -> String {
    format!(
        r#"You are a database SQL auditor. You judge whether generated SQL fulfils the user's request and fits the database structure.

<database_structure>
{schema}
</database_structure>

<user_input>
{user_input}
</user_input>

<operation>
Type: {kind}
Description: {description}
</operation>

<generated_sql>
{sql}
</generated_sql>

<audit_task>
Check whether the SQL correctly implements the request. Look for:
1. Syntax errors
2. Table or column names that do not match the database structure
3. A statement type (SELECT/INSERT/UPDATE/DELETE) that does not match the user's intent
4. Tables that do not match what the user asked about
5. Unreasonable or missing WHERE conditions
6. Selected columns that do not answer the request
7. Safety risks such as UPDATE or DELETE without WHERE
8. Today's date is {today}
</audit_task>

<output_format>
Answer with one JSON object following this schema:
```json
{{
  "type": "object",
  "required": ["is_valid", "issues", "suggested_operation_type", "suggested_description"],
  "properties": {{
    "is_valid": {{"type": "boolean", "description": "true when the SQL is correct"}},
    "issues": {{"type": "array", "items": {{"type": "string"}}, "description": "one entry per problem, empty when none"}},
    "suggested_operation_type": {{"type": "string", "description": "query, insert, update or delete"}},
    "suggested_description": {{"type": "string", "description": "corrected operation description, unchanged when there is no problem"}}
  }}
}}
```

When the SQL is correct:
```json
{{
  "is_valid": true,
  "issues": [],
  "suggested_operation_type": "query",
  "suggested_description": "List all users"
}}
```

When the SQL has problems:
```json
{{
  "is_valid": false,
  "issues": ["WHERE uses missing column 'user_status'", "Table should be 'user', not 'users'"],
  "suggested_operation_type": "query",
  "suggested_description": "List users whose status is active"
}}
```
</output_format>"#,
        schema = schema_markdown,
        user_input = user_input,
        kind = intent.kind_label(),
        description = intent.description,
        sql = sql,
        today = today()
    )
}

pub struct SqlAuditor {
    oracle: Oracle,
}

impl SqlAuditor {
    pub fn new(oracle: Oracle) -> Self {
        Self { oracle }
    }

    pub async fn audit(
        &self,
        ctx: &RequestContext,
        user_input: &str,
        sql: &str,
        intent: &OperationIntent,
        schema: &SchemaSnapshot,
    ) -> Result<AuditOutcome> {
        ctx.info(&format!("Auditing SQL: {}", preview(sql, 50)));

        let system_prompt =
            build_system_prompt(&format_schema_markdown(schema), user_input, intent, sql);
        let reply = self
            .oracle
            .invoke(&format!("Audit SQL: {}", sql), &system_prompt)
            .await?;

        let outcome = parse_audit_response(&reply.response, intent);
        match &outcome {
            AuditOutcome::Verdict(verdict) if verdict.is_valid => ctx.info("SQL audit passed"),
            AuditOutcome::Verdict(verdict) => {
                ctx.warn(&format!("SQL audit rejected: {:?}", verdict.issues))
            }
            AuditOutcome::Indeterminate { reason } => ctx.error(&format!(
                "Could not read audit result, accepting SQL: {}",
                reason
            )),
        }
        Ok(outcome)
    }
}
