//! Relational store access.
//!
//! The pipeline talks to the database through [`RelationalStore`]. Two
//! backends exist: PostgreSQL, which exposes table and column comments, and
//! SQLite, which has no comments and only offers a best-effort listing.

pub mod postgres;
pub mod sqlite;

use crate::domain::error::{AppError, Result};
use crate::domain::outcome::StoreOutput;
use crate::domain::schema::SchemaSnapshot;
use crate::infrastructure::config::DatabaseConfig;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

static BLOCK_COMMENT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static LINE_COMMENT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").unwrap());

static RETURNING_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bRETURNING\b").unwrap());

const ROW_RETURNING_KEYWORDS: [&str; 9] = [
    "SELECT", "WITH", "SHOW", "EXPLAIN", "VALUES", "PRAGMA", "DESCRIBE", "DESC", "TABLE",
];

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Short backend name, used in logs and prompts.
    fn dialect(&self) -> &'static str;

    /// Whether `column_comments` can return anything.
    fn supports_comments(&self) -> bool;

    /// Read the live schema. Every call hits the database.
    async fn introspect(&self) -> Result<SchemaSnapshot>;

    /// Non-empty `(column, comment)` pairs for one table.
    async fn column_comments(&self, table: &str) -> Result<Vec<(String, String)>>;

    /// Run one statement.
    async fn execute(&self, sql: &str) -> Result<StoreOutput>;
}

/// Whether a statement is expected to produce a row set rather than an
/// affected-row count.
pub fn returns_rows(sql: &str) -> bool {
    let without_blocks = BLOCK_COMMENT_PATTERN.replace_all(sql, " ");
    let body = LINE_COMMENT_PATTERN.replace_all(&without_blocks, " ");
    let body = body.trim_start_matches(|c: char| c == '(' || c.is_whitespace());

    let first_word = body
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or("")
        .to_uppercase();

    ROW_RETURNING_KEYWORDS.contains(&first_word.as_str()) || RETURNING_PATTERN.is_match(body)
}

/// Build the store for a connection URL.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn RelationalStore>> {
    let url = config.url.trim();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Arc::new(PostgresStore::connect(config).await?))
    } else if url.starts_with("sqlite:") {
        Ok(Arc::new(SqliteStore::connect(config).await?))
    } else {
        Err(AppError::ConfigError(format!(
            "Unsupported database url '{}': expected postgres:// or sqlite:",
            url
        )))
    }
}
