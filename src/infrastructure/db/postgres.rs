use super::{returns_rows, RelationalStore};
use crate::domain::error::{AppError, Result};
use crate::domain::outcome::{StoreOutput, StoreValue};
use crate::domain::schema::{
    default_column_comment, default_table_comment, ColumnSchema, SchemaSnapshot, TableSchema,
};
use crate::infrastructure::config::DatabaseConfig;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use sqlx::postgres::types::{PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgTypeKind};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

const TABLES_SQL: &str = r#"
    SELECT
        c.relname::text AS table_name,
        COALESCE(obj_description(c.oid, 'pg_class'), '') AS table_comment
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = current_schema()
        AND c.relkind IN ('r', 'p', 'v', 'm')
    ORDER BY c.relname
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        a.attname::text AS column_name,
        format_type(a.atttypid, a.atttypmod) AS data_type,
        COALESCE(col_description(a.attrelid, a.attnum), '') AS column_comment
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = current_schema()
        AND c.relname::text = $1
        AND a.attnum > 0
        AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

/// PostgreSQL backend. Comments come from `pg_description`.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url).map_err(|e| {
            AppError::ConfigError(format!("Failed to parse connection string: {}", e))
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                AppError::DatabaseError(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        info!(
            max_connections = config.max_connections,
            "Created PostgreSQL connection pool"
        );

        Ok(Self { pool })
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnSchema>> {
        let rows = sqlx::query(COLUMNS_SQL)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list columns: {}", e)))?;

        rows.iter()
            .map(|row| -> Result<ColumnSchema> {
                let name: String = row.try_get("column_name")?;
                let data_type: String = row.try_get("data_type")?;
                let comment: String = row.try_get("column_comment")?;
                Ok(ColumnSchema {
                    name,
                    data_type,
                    comment,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    fn dialect(&self) -> &'static str {
        "postgres"
    }

    fn supports_comments(&self) -> bool {
        true
    }

    async fn introspect(&self) -> Result<SchemaSnapshot> {
        let rows = sqlx::query(TABLES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list tables: {}", e)))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("table_name")?;
            let comment: String = row.try_get("table_comment")?;

            let columns = self
                .list_columns(&name)
                .await?
                .into_iter()
                .map(|mut col| {
                    if col.comment.trim().is_empty() {
                        col.comment = default_column_comment(&col.name);
                    }
                    col
                })
                .collect();

            let comment = if comment.trim().is_empty() {
                default_table_comment(&name)
            } else {
                comment
            };

            tables.push(TableSchema {
                name,
                comment,
                columns,
            });
        }

        debug!(tables = tables.len(), "Introspected PostgreSQL schema");
        Ok(SchemaSnapshot::new(tables))
    }

    async fn column_comments(&self, table: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .list_columns(table)
            .await?
            .into_iter()
            .filter(|col| !col.comment.trim().is_empty())
            .map(|col| (col.name, col.comment))
            .collect())
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

fn get<'r, T>(row: &'r PgRow, index: usize, wrap: impl FnOnce(T) -> StoreValue) -> StoreValue
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    match row.try_get::<T, _>(index) {
        Ok(value) => wrap(value),
        Err(e) => StoreValue::Other(format!("<undecodable: {}>", e)),
    }
}

fn list<'r, T>(row: &'r PgRow, index: usize, wrap: impl Fn(T) -> StoreValue) -> StoreValue
where
    Vec<T>: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    get(row, index, |values: Vec<T>| {
        StoreValue::List(values.into_iter().map(wrap).collect())
    })
}

fn utc(value: DateTime<Utc>) -> StoreValue {
    StoreValue::TimestampTz(value.into())
}

fn money(value: PgMoney) -> StoreValue {
    StoreValue::Decimal(value.to_bigdecimal(2))
}

fn interval(value: PgInterval) -> StoreValue {
    StoreValue::Other(format_interval(&value))
}

fn time_tz(value: PgTimeTz<NaiveTime, FixedOffset>) -> StoreValue {
    StoreValue::Other(format!("{}{}", value.time.format("%H:%M:%S%.f"), value.offset))
}

fn inet(value: IpNetwork) -> StoreValue {
    let host_prefix = if value.is_ipv4() { 32 } else { 128 };
    if value.prefix() == host_prefix {
        StoreValue::Other(value.ip().to_string())
    } else {
        StoreValue::Other(value.to_string())
    }
}

/// Render an interval the way PostgreSQL prints it with `IntervalStyle =
/// postgres`, e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(value: &PgInterval) -> String {
    fn unit(n: i32, name: &str) -> String {
        if n.abs() == 1 {
            format!("{} {}", n, name)
        } else {
            format!("{} {}s", n, name)
        }
    }

    let mut parts = Vec::new();
    let (years, months) = (value.months / 12, value.months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if value.days != 0 {
        parts.push(unit(value.days, "day"));
    }

    if value.microseconds != 0 || parts.is_empty() {
        let sign = if value.microseconds < 0 { "-" } else { "" };
        let total = value.microseconds.unsigned_abs();
        let (secs, frac) = (total / 1_000_000, total % 1_000_000);
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{:06}", frac);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

fn decode_value(row: &PgRow, index: usize) -> StoreValue {
    let is_null = row
        .try_get_raw(index)
        .map(|raw| raw.is_null())
        .unwrap_or(true);
    if is_null {
        return StoreValue::Null;
    }

    let type_info = row.column(index).type_info();
    match type_info.name() {
        "BOOL" => get(row, index, StoreValue::Bool),
        "INT2" => get(row, index, |v: i16| StoreValue::Int(v as i64)),
        "INT4" => get(row, index, |v: i32| StoreValue::Int(v as i64)),
        "INT8" => get(row, index, StoreValue::Int),
        "FLOAT4" => get(row, index, |v: f32| StoreValue::Float(v as f64)),
        "FLOAT8" => get(row, index, StoreValue::Float),
        "NUMERIC" => get(row, index, StoreValue::Decimal),
        "MONEY" => get(row, index, money),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "CITEXT" => {
            get(row, index, StoreValue::Text)
        }
        "UUID" => get(row, index, |v: Uuid| StoreValue::Text(v.to_string())),
        "DATE" => get(row, index, StoreValue::Date),
        "TIME" => get(row, index, StoreValue::Time),
        "TIMETZ" => get(row, index, time_tz),
        "TIMESTAMP" => get(row, index, StoreValue::Timestamp),
        "TIMESTAMPTZ" => get(row, index, utc),
        "INTERVAL" => get(row, index, interval),
        "INET" | "CIDR" => get(row, index, inet),
        "JSON" | "JSONB" => get(row, index, StoreValue::Json),
        "BYTEA" => get(row, index, StoreValue::Bytes),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => list(row, index, StoreValue::Text),
        "INT2[]" => list(row, index, |n: i16| StoreValue::Int(n as i64)),
        "INT4[]" => list(row, index, |n: i32| StoreValue::Int(n as i64)),
        "INT8[]" => list(row, index, StoreValue::Int),
        "FLOAT4[]" => list(row, index, |n: f32| StoreValue::Float(n as f64)),
        "FLOAT8[]" => list(row, index, StoreValue::Float),
        "BOOL[]" => list(row, index, StoreValue::Bool),
        "NUMERIC[]" => list(row, index, StoreValue::Decimal),
        "MONEY[]" => list(row, index, money),
        "UUID[]" => list(row, index, |v: Uuid| StoreValue::Text(v.to_string())),
        "DATE[]" => list(row, index, StoreValue::Date),
        "TIME[]" => list(row, index, StoreValue::Time),
        "TIMESTAMP[]" => list(row, index, StoreValue::Timestamp),
        "TIMESTAMPTZ[]" => list(row, index, utc),
        "INTERVAL[]" => list(row, index, interval),
        "INET[]" | "CIDR[]" => list(row, index, inet),
        "JSON[]" | "JSONB[]" => list(row, index, StoreValue::Json),
        other => {
            if let Ok(text) = row.try_get::<String, _>(index) {
                return StoreValue::Text(text);
            }
            // Enum values travel as their label.
            if matches!(type_info.kind(), PgTypeKind::Enum(_)) {
                if let Ok(label) = row.try_get_unchecked::<String, _>(index) {
                    return StoreValue::Text(label);
                }
            }
            StoreValue::Other(format!("<{}>", other))
        }
    }
}
