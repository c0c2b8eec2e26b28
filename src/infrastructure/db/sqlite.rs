use super::{returns_rows, RelationalStore};
use crate::domain::error::{AppError, Result};
use crate::domain::outcome::{StoreOutput, StoreValue};
use crate::domain::schema::{
    default_column_comment, default_table_comment, ColumnSchema, SchemaSnapshot, TableSchema,
};
use crate::infrastructure::config::DatabaseConfig;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

/// SQLite backend. SQLite has no comment catalog, so every table and column
/// gets the default comment.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| {
                AppError::ConfigError(format!("Failed to parse connection string: {}", e))
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to open SQLite database: {}", e);
                AppError::DatabaseError(format!("Failed to connect: {}", e))
            })?;

        info!(url = %config.url, "Opened SQLite database");
        Ok(Self { pool })
    }

    #[cfg(test)]
    fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnSchema>> {
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?1)")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list columns: {}", e)))?;

        rows.iter()
            .map(|row| -> Result<ColumnSchema> {
                let name: String = row.try_get("name")?;
                let data_type: String = row.try_get("type")?;
                Ok(ColumnSchema {
                    comment: default_column_comment(&name),
                    name,
                    data_type,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    fn supports_comments(&self) -> bool {
        false
    }

    async fn introspect(&self) -> Result<SchemaSnapshot> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list tables: {}", e)))?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = self.list_columns(&name).await?;
            tables.push(TableSchema {
                comment: default_table_comment(&name),
                name,
                columns,
            });
        }

        debug!(tables = tables.len(), "Introspected SQLite schema");
        Ok(SchemaSnapshot::new(tables))
    }

    async fn column_comments(&self, _table: &str) -> Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str) -> Result<StoreOutput> {
        if !returns_rows(sql) {
            let result = sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
            return Ok(StoreOutput::Affected(result.rows_affected()));
        }

        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let values = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| decode_value(row, i)).collect())
            .collect();

        Ok(StoreOutput::Rows {
            columns,
            rows: values,
        })
    }
}

fn decode_value(row: &SqliteRow, index: usize) -> StoreValue {
    let is_null = row
        .try_get_raw(index)
        .map(|raw| raw.is_null())
        .unwrap_or(true);
    if is_null {
        return StoreValue::Null;
    }

    // Declared type first, then whatever storage class the value actually has.
    let declared = row.column(index).type_info().name().to_uppercase();
    let typed = match declared.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).ok().map(StoreValue::Bool),
        "DATETIME" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .ok()
            .map(StoreValue::Timestamp),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .ok()
            .map(StoreValue::Date),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .ok()
            .map(StoreValue::Time),
        _ => None,
    };
    if let Some(value) = typed {
        return value;
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return StoreValue::Int(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return StoreValue::Float(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return StoreValue::Text(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return StoreValue::Bytes(v);
    }
    StoreValue::Other(format!("<{}>", declared))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT NOT NULL, amount REAL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO orders (id, customer, amount) VALUES (1, 'alice', 12.5), (2, 'bob', NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        SqliteStore::from_pool(pool)
    }

    #[tokio::test]
    async fn test_introspect_applies_default_comments() {
        let store = store().await;
        let schema = store.introspect().await.unwrap();

        assert_eq!(schema.table_names(), vec!["orders"]);
        let orders = &schema.tables[0];
        assert_eq!(orders.comment, "orders table");
        assert_eq!(orders.columns.len(), 3);
        assert_eq!(orders.columns[1].name, "customer");
        assert_eq!(orders.columns[1].comment, "customer column");
        assert!(store.column_comments("orders").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_returns_rows() {
        let store = store().await;
        let output = store
            .execute("SELECT id, customer, amount FROM orders ORDER BY id")
            .await
            .unwrap();

        match output {
            StoreOutput::Rows { columns, rows } => {
                assert_eq!(columns, vec!["id", "customer", "amount"]);
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0][0], StoreValue::Int(1));
                assert_eq!(rows[0][1], StoreValue::Text("alice".to_string()));
                assert_eq!(rows[0][2], StoreValue::Float(12.5));
                assert_eq!(rows[1][2], StoreValue::Null);
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_comment_prefixed_select_returns_rows() {
        let store = store().await;
        let output = store
            .execute("/* total per order */ SELECT id, amount FROM orders ORDER BY id")
            .await
            .unwrap();

        match output {
            StoreOutput::Rows { columns, rows } => {
                assert_eq!(columns, vec!["id", "amount"]);
                assert_eq!(rows.len(), 2);
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dml_returns_affected_count() {
        let store = store().await;
        let output = store
            .execute("UPDATE orders SET amount = 0 WHERE amount IS NULL")
            .await
            .unwrap();
        assert_eq!(output, StoreOutput::Affected(1));
    }

    #[tokio::test]
    async fn test_unknown_table_is_database_error() {
        let store = store().await;
        let result = store.execute("SELECT * FROM missing").await;
        assert!(matches!(result, Err(AppError::DatabaseError(_))));
    }
}
