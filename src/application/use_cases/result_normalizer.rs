//! Statement execution and result normalization.
//!
//! Row sets are relabeled with column comments and every value is coerced
//! into JSON. The relabeling works on the raw SQL text with a handful of
//! regexes, not a parser, so joins over subqueries or exotic aliasing can
//! pick the wrong comment or none at all.

use super::request_context::RequestContext;
use crate::domain::outcome::{QueryOutcome, StoreOutput, StoreValue};
use crate::infrastructure::db::RelationalStore;
use once_cell::sync::Lazy;
use regex::{Match, Regex};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

static FROM_TABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bFROM\s+`?(\w+)`?").unwrap());

static JOIN_TABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bJOIN\s+`?(\w+)`?").unwrap());

static QUALIFIED_ALIAS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\w+)\.(\w+)(?:\s+AS\s+|\s+)(\w+)").unwrap());

static EXPLICIT_ALIAS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\w+)\s+AS\s+(\w+)").unwrap());

static BARE_ALIAS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)`?(\w+)`?\s+(?:AS\s+)?`?(\w+)`?").unwrap());

/// Tables named by the first `FROM` and every `JOIN`.
pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables = Vec::new();
    if let Some(caps) = FROM_TABLE_PATTERN.captures(sql) {
        tables.push(caps[1].to_string());
    }
    tables.extend(
        JOIN_TABLE_PATTERN
            .captures_iter(sql)
            .map(|caps| caps[1].to_string()),
    );
    tables
}

// The column half of `t.c`, which the qualified pass already resolved.
fn follows_qualifier(sql: &str, m: Match<'_>) -> bool {
    sql[..m.start()].ends_with('.')
}

/// Copy comments onto aliases. An alias only inherits a comment its source
/// column already has.
pub fn apply_alias_comments(sql: &str, comments: &mut HashMap<String, String>) {
    for caps in QUALIFIED_ALIAS_PATTERN.captures_iter(sql) {
        let qualified = format!("{}.{}", &caps[1], &caps[2]);
        let comment = comments
            .get(&qualified)
            .or_else(|| comments.get(&caps[2]))
            .cloned();
        if let Some(comment) = comment {
            comments.insert(caps[3].to_string(), comment);
        }
    }

    for caps in EXPLICIT_ALIAS_PATTERN.captures_iter(sql) {
        if caps.get(0).is_some_and(|m| follows_qualifier(sql, m)) {
            continue;
        }
        if let Some(comment) = comments.get(&caps[1]).cloned() {
            comments.insert(caps[2].to_string(), comment);
        }
    }

    for caps in BARE_ALIAS_PATTERN.captures_iter(sql) {
        if caps[1] == caps[2] || caps.get(0).is_some_and(|m| follows_qualifier(sql, m)) {
            continue;
        }
        if let Some(comment) = comments.get(&caps[1]).cloned() {
            comments.insert(caps[2].to_string(), comment);
        }
    }
}

/// JSON form of one store value. Temporal values become ISO-8601 strings,
/// lists become arrays, and anything without a JSON shape becomes a string.
pub fn coerce_value(value: StoreValue) -> Value {
    match value {
        StoreValue::Null => Value::Null,
        StoreValue::Bool(b) => Value::Bool(b),
        StoreValue::Int(i) => Value::Number(i.into()),
        StoreValue::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        StoreValue::Decimal(d) => Value::String(d.to_string()),
        StoreValue::Text(s) => Value::String(s),
        StoreValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        StoreValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        StoreValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        StoreValue::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        StoreValue::TimestampTz(ts) => Value::String(ts.to_rfc3339()),
        StoreValue::Json(v) => v,
        StoreValue::List(items) => Value::Array(items.into_iter().map(coerce_value).collect()),
        StoreValue::Other(s) => Value::String(s),
    }
}

/// Rows between two progress updates.
pub fn progress_step(total_rows: usize) -> usize {
    (total_rows / 10).clamp(1, 100)
}

pub struct ResultNormalizer {
    store: Arc<dyn RelationalStore>,
}

impl ResultNormalizer {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    /// Run `sql` once. Store failures come back as `QueryOutcome::Error`.
    pub async fn execute(&self, ctx: &RequestContext, sql: &str) -> QueryOutcome {
        ctx.progress("Executing SQL query...");

        let output = match self.store.execute(sql).await {
            Ok(output) => output,
            Err(e) => {
                ctx.error(&format!("SQL execution failed: {}", e));
                return QueryOutcome::Error {
                    error: e.to_string(),
                };
            }
        };

        match output {
            StoreOutput::Affected(affected_rows) => QueryOutcome::NonQuery { affected_rows },
            StoreOutput::Rows { columns, rows } => {
                ctx.progress("Fetching column comments...");
                let comments = self.column_comments(ctx, sql).await;

                ctx.progress("Processing query results...");
                let display: Vec<String> = columns
                    .iter()
                    .map(|col| comments.get(col).cloned().unwrap_or_else(|| col.clone()))
                    .collect();

                let total = rows.len();
                let step = progress_step(total);
                let mut results = Vec::with_capacity(total);
                for (idx, row) in rows.into_iter().enumerate() {
                    let mut record = Map::new();
                    for (key, value) in display.iter().zip(row) {
                        record.insert(key.clone(), coerce_value(value));
                    }
                    results.push(record);

                    let done = idx + 1;
                    if done % step == 0 || done == total {
                        ctx.progress(format!(
                            "Processing rows... ({}/{} rows, {:.1}%)",
                            done,
                            total,
                            done as f64 / total as f64 * 100.0
                        ));
                    }
                }

                ctx.progress("Query finished, returning results...");
                QueryOutcome::Query {
                    row_count: results.len(),
                    results,
                    columns: display,
                    formatted_view: None,
                }
            }
        }
    }

    /// Column name (or `table.column` on collision, or alias) → comment.
    async fn column_comments(&self, ctx: &RequestContext, sql: &str) -> HashMap<String, String> {
        let mut comments = HashMap::new();

        let tables = extract_tables(sql);
        if self.store.supports_comments() {
            for table in &tables {
                match self.store.column_comments(table).await {
                    Ok(pairs) => {
                        for (column, comment) in pairs {
                            if comment.trim().is_empty() {
                                continue;
                            }
                            if comments.contains_key(&column) {
                                comments.insert(format!("{}.{}", table, column), comment);
                            } else {
                                comments.insert(column, comment);
                            }
                        }
                    }
                    Err(e) => {
                        ctx.warn(&format!("Failed to read column comments for {}: {}", table, e))
                    }
                }
            }
        }

        apply_alias_comments(sql, &mut comments);
        comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::{context, drain, orders_schema, FakeStore};
    use crate::domain::error::AppError;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn comments(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extract_tables() {
        let sql = "SELECT o.amount, c.name FROM `orders` o JOIN customers c ON c.id = o.customer_id \
                   left join regions r on r.id = c.region_id";
        assert_eq!(extract_tables(sql), vec!["orders", "customers", "regions"]);
        assert!(extract_tables("INSERT INTO orders VALUES (1)").is_empty());
    }

    #[test]
    fn test_alias_passes() {
        let mut map = comments(&[("amount", "金额"), ("customers.name", "客户名")]);
        apply_alias_comments(
            "SELECT o.amount AS total, customers.name who, amount paid FROM orders o",
            &mut map,
        );
        assert_eq!(map["total"], "金额");
        assert_eq!(map["who"], "客户名");
        assert_eq!(map["paid"], "金额");
    }

    #[test]
    fn test_qualified_alias_not_overridden() {
        let mut map = comments(&[("note", "订单备注"), ("customers.note", "客户备注")]);
        apply_alias_comments(
            "SELECT orders.note, customers.note AS cn, customers.note cb, note AS n FROM orders",
            &mut map,
        );
        assert_eq!(map["cn"], "客户备注");
        assert_eq!(map["cb"], "客户备注");
        assert_eq!(map["n"], "订单备注");
    }

    #[test]
    fn test_alias_without_comment_ignored() {
        let mut map = comments(&[("amount", "金额")]);
        apply_alias_comments("SELECT status AS state FROM orders", &mut map);
        assert!(!map.contains_key("state"));
    }

    #[test]
    fn test_coerce_values() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(coerce_value(StoreValue::Timestamp(ts)), json!("2024-05-01T08:30:00"));
        assert_eq!(
            coerce_value(StoreValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())),
            json!("2024-05-01")
        );
        let tz = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        assert_eq!(
            coerce_value(StoreValue::TimestampTz(tz.into())),
            json!("2024-05-01T08:30:00+00:00")
        );
        assert_eq!(
            coerce_value(StoreValue::Decimal("12.50".parse().unwrap())),
            json!("12.50")
        );
        assert_eq!(coerce_value(StoreValue::Float(f64::NAN)), json!("NaN"));
        assert_eq!(
            coerce_value(StoreValue::List(vec![StoreValue::Int(1), StoreValue::Null])),
            json!([1, null])
        );
        assert_eq!(coerce_value(StoreValue::Json(json!({"a": 1}))), json!({"a": 1}));
    }

    #[test]
    fn test_progress_step() {
        assert_eq!(progress_step(0), 1);
        assert_eq!(progress_step(7), 1);
        assert_eq!(progress_step(250), 25);
        assert_eq!(progress_step(50_000), 100);
    }

    #[tokio::test]
    async fn test_rows_keyed_by_comment() {
        let store = FakeStore::new(orders_schema()).with_output(Ok(StoreOutput::Rows {
            columns: vec!["id".to_string(), "amount".to_string()],
            rows: vec![
                vec![StoreValue::Int(1), StoreValue::Float(12.5)],
                vec![StoreValue::Int(2), StoreValue::Null],
            ],
        }));
        let normalizer = ResultNormalizer::new(Arc::new(store));
        let (ctx, mut rx) = context();

        let outcome = normalizer
            .execute(&ctx, "SELECT id, amount FROM orders")
            .await;

        match &outcome {
            QueryOutcome::Query {
                results,
                columns,
                row_count,
                ..
            } => {
                assert_eq!(*row_count, 2);
                assert_eq!(columns, &vec!["id".to_string(), "金额".to_string()]);
                assert_eq!(results[0]["金额"], json!(12.5));
                assert!(results[0].get("amount").is_none());
                assert_eq!(results[1]["id"], json!(2));
            }
            other => panic!("expected query outcome, got {:?}", other),
        }

        let progress: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| m.loading_message)
            .collect();
        assert!(progress.contains(&"Processing rows... (2/2 rows, 100.0%)".to_string()));
    }

    #[tokio::test]
    async fn test_shared_column_name_keyed_by_table() {
        let mut store = FakeStore::new(orders_schema()).with_output(Ok(StoreOutput::Rows {
            columns: vec!["note".to_string(), "cn".to_string()],
            rows: vec![vec![
                StoreValue::Text("rush".to_string()),
                StoreValue::Text("vip".to_string()),
            ]],
        }));
        store.comments = HashMap::from([
            (
                "orders".to_string(),
                vec![("note".to_string(), "订单备注".to_string())],
            ),
            (
                "customers".to_string(),
                vec![("note".to_string(), "客户备注".to_string())],
            ),
        ]);
        let normalizer = ResultNormalizer::new(Arc::new(store));
        let (ctx, _rx) = context();
        let sql = "SELECT orders.note, customers.note AS cn FROM orders \
                   JOIN customers ON customers.id = orders.customer_id";

        let map = normalizer.column_comments(&ctx, sql).await;
        assert_eq!(map["note"], "订单备注");
        assert_eq!(map["customers.note"], "客户备注");

        match normalizer.execute(&ctx, sql).await {
            QueryOutcome::Query {
                results, columns, ..
            } => {
                assert_eq!(columns, vec!["订单备注".to_string(), "客户备注".to_string()]);
                assert_eq!(results[0]["订单备注"], json!("rush"));
                assert_eq!(results[0]["客户备注"], json!("vip"));
            }
            other => panic!("expected query outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_comments_without_capability() {
        let mut store = FakeStore::new(orders_schema()).with_output(Ok(StoreOutput::Rows {
            columns: vec!["amount".to_string()],
            rows: vec![vec![StoreValue::Int(3)]],
        }));
        store.supports_comments = false;
        let normalizer = ResultNormalizer::new(Arc::new(store));
        let (ctx, _rx) = context();

        let outcome = normalizer.execute(&ctx, "SELECT amount FROM orders").await;
        match outcome {
            QueryOutcome::Query { results, .. } => assert_eq!(results[0]["amount"], json!(3)),
            other => panic!("expected query outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_affected_rows_and_errors() {
        let store = FakeStore::new(orders_schema())
            .with_output(Ok(StoreOutput::Affected(3)))
            .with_output(Err(AppError::DatabaseError("no such table: nope".to_string())));
        let normalizer = ResultNormalizer::new(Arc::new(store));
        let (ctx, _rx) = context();

        assert_eq!(
            normalizer.execute(&ctx, "DELETE FROM orders").await,
            QueryOutcome::NonQuery { affected_rows: 3 }
        );
        assert_eq!(
            normalizer.execute(&ctx, "SELECT * FROM nope").await,
            QueryOutcome::Error {
                error: "Database error: no such table: nope".to_string()
            }
        );
    }
}
