//! In-memory fixtures for unit tests

use crate::catalog::Catalog;
use crate::db::StatementExecutor;
use crate::error::{AssistantError, Result};
use crate::llm::SqlGenerator;
use crate::schema::{ColumnDescriptor, FieldOption, ForeignKey, QueryResult, SchemaInfo};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct StaticCatalog {
    schema: SchemaInfo,
    rows: HashMap<String, Vec<Map<String, Value>>>,
    lookups: AtomicUsize,
}

impl StaticCatalog {
    pub fn without_rows(mut self, table: &str) -> Self {
        self.rows.insert(table.to_string(), Vec::new());
        self
    }

    /// Number of `referenced_ids` calls served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Department/employee tables and rows shared with the integration tests.
#[derive(Deserialize)]
pub struct HrFixture {
    pub schema: SchemaInfo,
    pub rows: HashMap<String, Vec<Map<String, Value>>>,
}

pub fn hr_fixture() -> HrFixture {
    serde_json::from_str(include_str!("../tests/fixtures/hr.json")).expect("valid hr fixture")
}

/// Two departments and one employee.
pub fn hr_catalog() -> StaticCatalog {
    let HrFixture { schema, rows } = hr_fixture();
    StaticCatalog {
        schema,
        rows,
        lookups: AtomicUsize::new(0),
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn fetch(&self) -> Result<SchemaInfo> {
        Ok(self.schema.clone())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(self
            .schema
            .table(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        Ok(self
            .schema
            .table(table)
            .map(|t| t.foreign_keys.clone())
            .unwrap_or_default())
    }

    async fn reference_options(
        &self,
        foreign_key: &ForeignKey,
        display_column: &str,
    ) -> Result<Vec<FieldOption>> {
        let mut options: Vec<FieldOption> = self
            .rows
            .get(&foreign_key.referenced_table)
            .map(|rows| {
                rows.iter()
                    .map(|row| FieldOption {
                        id: row.get(&foreign_key.referenced_column).map(text).unwrap_or_default(),
                        name: row.get(display_column).map(text).unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        options.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(options)
    }

    async fn referenced_ids(&self, table: &str, column: &str) -> Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .get(table)
            .map(|rows| rows.iter().filter_map(|row| row.get(column).map(text)).collect())
            .unwrap_or_default())
    }
}

/// Records executed statements; inserts echo the values back.
#[derive(Default)]
pub struct RecordingExecutor {
    pub statements: Mutex<Vec<String>>,
    pub fail_inserts: bool,
}

impl RecordingExecutor {
    pub fn executed(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatementExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(QueryResult::Select {
            columns: vec!["name".to_string()],
            rows: vec![vec![json!("Asha")]],
            row_count: 1,
            execution_time: 0.0,
        })
    }

    async fn insert_row(&self, _table: &str, values: &Map<String, Value>) -> Result<Map<String, Value>> {
        if self.fail_inserts {
            return Err(AssistantError::ExecutionError("null value in column".to_string()));
        }
        Ok(values.clone())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Generator that always answers with the same text.
pub struct FixedGenerator(pub &'static str);

#[async_trait]
impl SqlGenerator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hr_fixture_is_consistent() {
        let HrFixture { schema, rows } = hr_fixture();
        let department = schema.table("department").unwrap();
        assert_eq!(department.column("location").unwrap().max_length, Some(50));
        assert!(!schema.table("employee").unwrap().column("name").unwrap().nullable);

        let dept_ids: Vec<&Value> = rows["department"].iter().map(|row| &row["dept_id"]).collect();
        for employee in &rows["employee"] {
            assert!(dept_ids.contains(&&employee["dept_id"]));
        }
    }
}
