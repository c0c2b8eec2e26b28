//! Live schema snapshot as seen by the pipeline.
//!
//! Tables keep the order the introspection query returned them in; the
//! relevance ranking uses that order to break ties.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub comment: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|col| col.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Comment used when the store has none for a column.
pub fn default_column_comment(column: &str) -> String {
    format!("{} column", column)
}

/// Comment used when the store has none for a table.
pub fn default_table_comment(table: &str) -> String {
    format!("{} table", table)
}
