//! Statement execution
//!
//! Runs one validated statement per call inside its own transaction and
//! classifies the outcome as a row set or a modification count.

use crate::catalog::quote_ident;
use crate::db::connection::ConnectionFactory;
use crate::error::{AssistantError, Result};
use crate::schema::QueryResult;
use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgConnection, PgQueryResult, PgRow};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const MODIFICATION_MESSAGE: &str = "Query executed successfully";

type SqlFuture<'c, T> = Pin<Box<dyn Future<Output = std::result::Result<T, sqlx::Error>> + Send + 'c>>;

#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Run a single statement, committing on success and rolling back on failure.
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Insert one row built from `values` (column → value) and return the stored row.
    async fn insert_row(&self, table: &str, values: &Map<String, Value>) -> Result<Map<String, Value>>;

    /// Database reachability check.
    async fn ping(&self) -> Result<()>;
}

pub struct PgExecutor {
    connections: ConnectionFactory,
}

impl PgExecutor {
    pub fn new(connections: ConnectionFactory) -> Self {
        Self { connections }
    }

    async fn run_in_transaction(conn: &mut PgConnection, sql: &str) -> Result<QueryResult> {
        let mut tx = conn.begin().await.map_err(execution_error)?;

        match Self::run_statement(&mut tx, sql).await {
            Ok(result) => {
                tx.commit().await.map_err(execution_error)?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn run_statement(conn: &mut PgConnection, sql: &str) -> Result<QueryResult> {
        let described = (&mut *conn).describe(sql).await.map_err(execution_error)?;
        let columns: Vec<(String, String)> = described
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
            .collect();

        if columns.is_empty() {
            let started = Instant::now();
            let outcome = execute_text(&mut *conn, sql).await.map_err(execution_error)?;
            let execution_time = started.elapsed().as_secs_f64();

            return Ok(QueryResult::Modification {
                row_count: outcome.rows_affected(),
                execution_time,
                message: MODIFICATION_MESSAGE.to_string(),
            });
        }

        // The simple query protocol returns every value in text form, so any
        // column type can be read back and converted per declared type.
        let started = Instant::now();
        let rows = fetch_text_rows(&mut *conn, sql).await.map_err(execution_error)?;
        let execution_time = started.elapsed().as_secs_f64();

        let mut data = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, (_, type_name)) in columns.iter().enumerate() {
                let raw: Option<String> = row.try_get_unchecked(idx).map_err(execution_error)?;
                values.push(text_to_json(type_name, raw.as_deref()));
            }
            data.push(values);
        }

        Ok(QueryResult::Select {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            row_count: data.len(),
            rows: data,
            execution_time,
        })
    }
}

#[async_trait]
impl StatementExecutor for PgExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let mut conn = self.connections.open().await?;
        let result = Self::run_in_transaction(&mut conn, sql).await;
        self.connections.release(conn).await;

        match &result {
            Ok(outcome) => info!(
                "Statement finished: {} rows in {:.4}s",
                outcome.row_count(),
                outcome.execution_time()
            ),
            Err(e) => error!("Query execution failed: {}", e),
        }
        result
    }

    async fn insert_row(&self, table: &str, values: &Map<String, Value>) -> Result<Map<String, Value>> {
        let sql = build_insert_sql(table, values.keys().map(String::as_str));
        let payload = Value::Object(values.clone()).to_string();
        debug!("Insert statement: {}", sql);

        let mut conn = self.connections.open().await?;
        let result = async {
            let mut tx = conn.begin().await.map_err(execution_error)?;
            let inserted: std::result::Result<(String,), _> =
                sqlx::query_as(&sql).bind(&payload).fetch_one(&mut *tx).await;
            match inserted {
                Ok((row_json,)) => {
                    tx.commit().await.map_err(execution_error)?;
                    Ok(row_json)
                }
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!("Rollback failed: {}", rollback_err);
                    }
                    Err(execution_error(e))
                }
            }
        }
        .await;
        self.connections.release(conn).await;

        let row_json = result?;
        match serde_json::from_str::<Value>(&row_json)? {
            Value::Object(row) => Ok(row),
            other => Err(AssistantError::ExecutionError(format!(
                "Unexpected inserted row shape: {}",
                other
            ))),
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connections.open().await?;
        let result = sqlx::query("SELECT 1").execute(&mut conn).await;
        self.connections.release(conn).await;

        result
            .map(|_| ())
            .map_err(|e| AssistantError::StorageUnavailable(e.to_string()))
    }
}

// The raw-sql futures are boxed outside the async-trait bodies so their Send
// bound is checked against one concrete connection lifetime.
fn execute_text<'c>(conn: &'c mut PgConnection, sql: &'c str) -> SqlFuture<'c, PgQueryResult> {
    conn.execute(sqlx::raw_sql(sql))
}

fn fetch_text_rows<'c>(conn: &'c mut PgConnection, sql: &'c str) -> SqlFuture<'c, Vec<PgRow>> {
    conn.fetch_all(sqlx::raw_sql(sql))
}

/// Build an `INSERT ... RETURNING *` whose values come from a single JSON
/// parameter. `json_populate_record` converts each field to its column type.
pub fn build_insert_sql<'a>(table: &str, columns: impl Iterator<Item = &'a str>) -> String {
    let table = quote_ident(table);
    let columns: Vec<String> = columns.map(quote_ident).collect();

    let insert = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table)
    } else {
        let list = columns.join(", ");
        format!(
            "INSERT INTO {table} ({list}) SELECT {list} FROM json_populate_record(NULL::{table}, $1::json) RETURNING *",
            table = table,
            list = list,
        )
    };

    let sql = format!(
        "WITH inserted AS ({}) SELECT row_to_json(inserted)::text FROM inserted",
        insert
    );
    if columns.is_empty() {
        // Keep the parameter count stable for the caller's single bind.
        format!("{} WHERE $1::text IS NOT NULL", sql)
    } else {
        sql
    }
}

/// Convert a text-protocol value to JSON using the column's declared type.
pub fn text_to_json(type_name: &str, raw: Option<&str>) -> Value {
    let Some(text) = raw else {
        return Value::Null;
    };

    match type_name {
        "BOOL" => match text {
            "t" | "true" => Value::Bool(true),
            "f" | "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(text.to_string())),
        // NUMERIC keeps its exact decimal text.
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        "JSON" | "JSONB" => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        _ => Value::String(text.to_string()),
    }
}

fn execution_error(e: sqlx::Error) -> AssistantError {
    AssistantError::ExecutionError(e.to_string())
}
