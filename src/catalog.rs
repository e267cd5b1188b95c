//! Schema catalog
//!
//! Reads table, column and foreign-key metadata straight from
//! `information_schema` on every call. Nothing is cached, so callers always
//! see the structure the database has right now.

use crate::db::connection::ConnectionFactory;
use crate::error::{AssistantError, Result};
use crate::schema::{ColumnDescriptor, FieldOption, ForeignKey, SchemaInfo, TableSchema};
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use tracing::{debug, info};

/// Live metadata lookups needed by prompt composition, reference validation
/// and the insert dialogue.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every base table with its columns and foreign-key edges.
    async fn fetch(&self) -> Result<SchemaInfo>;

    /// Columns of one table in ordinal order; empty if the table does not exist.
    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    /// `(id, display)` pairs of the referenced table, sorted by the display column.
    async fn reference_options(
        &self,
        foreign_key: &ForeignKey,
        display_column: &str,
    ) -> Result<Vec<FieldOption>>;

    /// All values of `column` in `table`, rendered as text.
    async fn referenced_ids(&self, table: &str, column: &str) -> Result<Vec<String>>;
}

const TABLES_SQL: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        column_name::text,
        data_type::text,
        is_nullable::text,
        character_maximum_length::int4,
        column_default::text
    FROM information_schema.columns
    WHERE table_schema = 'public' AND table_name = $1
    ORDER BY ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        kcu.column_name::text,
        ccu.table_name::text AS foreign_table,
        ccu.column_name::text AS foreign_column
    FROM
        information_schema.table_constraints AS tc
        JOIN information_schema.key_column_usage AS kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.constraint_schema = kcu.constraint_schema
        JOIN information_schema.constraint_column_usage AS ccu
          ON ccu.constraint_name = tc.constraint_name
         AND ccu.constraint_schema = tc.constraint_schema
    WHERE
        tc.constraint_type = 'FOREIGN KEY' AND
        tc.table_schema = 'public' AND
        tc.table_name = $1
    ORDER BY kcu.ordinal_position
"#;

type ColumnRow = (String, String, String, Option<i32>, Option<String>);

/// Catalog backed by a live PostgreSQL database.
pub struct PgCatalog {
    connections: ConnectionFactory,
}

impl PgCatalog {
    pub fn new(connections: ConnectionFactory) -> Self {
        Self { connections }
    }

    async fn load_schema(conn: &mut PgConnection) -> Result<SchemaInfo> {
        let tables: Vec<(String,)> = sqlx::query_as(TABLES_SQL)
            .fetch_all(&mut *conn)
            .await
            .map_err(storage_error("list tables"))?;

        let mut schema = SchemaInfo::default();
        for (table,) in tables {
            let columns = Self::load_columns(conn, &table).await?;
            let foreign_keys = Self::load_foreign_keys(conn, &table).await?;
            debug!(
                "Table {}: {} columns, {} foreign keys",
                table,
                columns.len(),
                foreign_keys.len()
            );
            schema.tables.insert(table, TableSchema { columns, foreign_keys });
        }
        Ok(schema)
    }

    async fn load_columns(conn: &mut PgConnection, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows: Vec<ColumnRow> = sqlx::query_as(COLUMNS_SQL)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(storage_error("load columns"))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, max_length, default)| ColumnDescriptor {
                name,
                data_type,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                max_length,
                default,
            })
            .collect())
    }

    async fn load_foreign_keys(conn: &mut PgConnection, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(FOREIGN_KEYS_SQL)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(storage_error("load foreign keys"))?;

        Ok(rows
            .into_iter()
            .map(|(column, referenced_table, referenced_column)| ForeignKey {
                column,
                referenced_table,
                referenced_column,
            })
            .collect())
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn fetch(&self) -> Result<SchemaInfo> {
        let mut conn = self.connections.open().await?;
        let result = Self::load_schema(&mut conn).await;
        self.connections.release(conn).await;

        let schema = result?;
        info!("Schema fetched: {} tables", schema.tables.len());
        Ok(schema)
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut conn = self.connections.open().await?;
        let result = Self::load_columns(&mut conn, table).await;
        self.connections.release(conn).await;
        result
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let mut conn = self.connections.open().await?;
        let result = Self::load_foreign_keys(&mut conn, table).await;
        self.connections.release(conn).await;
        result
    }

    async fn reference_options(
        &self,
        foreign_key: &ForeignKey,
        display_column: &str,
    ) -> Result<Vec<FieldOption>> {
        let sql = format!(
            "SELECT {id}::text, {display}::text FROM {table} ORDER BY {display} ASC",
            id = quote_ident(&foreign_key.referenced_column),
            display = quote_ident(display_column),
            table = quote_ident(&foreign_key.referenced_table),
        );

        let mut conn = self.connections.open().await?;
        let result: std::result::Result<Vec<(Option<String>, Option<String>)>, _> =
            sqlx::query_as(&sql).fetch_all(&mut conn).await;
        self.connections.release(conn).await;

        let rows = result.map_err(storage_error("load reference options"))?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| FieldOption {
                id: id.unwrap_or_default(),
                name: name.unwrap_or_default(),
            })
            .collect())
    }

    async fn referenced_ids(&self, table: &str, column: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT {column}::text FROM {table} WHERE {column} IS NOT NULL ORDER BY {column}",
            column = quote_ident(column),
            table = quote_ident(table),
        );

        let mut conn = self.connections.open().await?;
        let result: std::result::Result<Vec<(String,)>, _> =
            sqlx::query_as(&sql).fetch_all(&mut conn).await;
        self.connections.release(conn).await;

        Ok(result
            .map_err(storage_error("load referenced ids"))?
            .into_iter()
            .map(|(id,)| id)
            .collect())
    }
}

/// Double-quote an identifier so it can be spliced into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn storage_error(context: &'static str) -> impl Fn(sqlx::Error) -> AssistantError {
    move |e| AssistantError::StorageUnavailable(format!("Failed to {}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("department"), "\"department\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
