use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A single cell as decoded from the relational store, before coercion into
/// JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Json(Value),
    /// Arrays and other set-like containers.
    List(Vec<StoreValue>),
    /// Values the store could not decode into a known shape.
    Other(String),
}

/// Raw store answer for one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutput {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<StoreValue>>,
    },
    Affected(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDisplay {
    /// Original column name → display name. Empty means keep the originals.
    #[serde(default)]
    pub columns: HashMap<String, String>,
    #[serde(default)]
    pub description: String,
}

/// Best-effort annotation produced by the result summarizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultPresentation {
    pub table_display: TableDisplay,
    #[serde(default)]
    pub summary: String,
}

impl ResultPresentation {
    pub fn neutral(row_count: usize) -> Self {
        Self {
            table_display: TableDisplay {
                columns: HashMap::new(),
                description: "Query result".to_string(),
            },
            summary: format!("The query returned {} rows.", row_count),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum QueryOutcome {
    #[serde(rename = "query")]
    Query {
        results: Vec<Map<String, Value>>,
        columns: Vec<String>,
        #[serde(rename = "rowCount")]
        row_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        formatted_view: Option<ResultPresentation>,
    },
    #[serde(rename = "non-query")]
    NonQuery { affected_rows: u64 },
    #[serde(rename = "error")]
    Error { error: String },
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, QueryOutcome::Error { .. })
    }

    /// True for a row set with at least one row, the only case worth
    /// summarizing.
    pub fn has_rows(&self) -> bool {
        matches!(self, QueryOutcome::Query { row_count, .. } if *row_count > 0)
    }

    pub fn status_line(&self) -> String {
        match self {
            QueryOutcome::Query { row_count, .. } => {
                format!("Query succeeded, returned {} rows.", row_count)
            }
            QueryOutcome::NonQuery { affected_rows } => {
                format!("Operation succeeded, affected {} rows.", affected_rows)
            }
            QueryOutcome::Error { error } => format!("Execution failed: {}", error),
        }
    }
}
