#![allow(dead_code)]

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sql_assistant::catalog::Catalog;
use sql_assistant::conversation::ConversationStore;
use sql_assistant::db::StatementExecutor;
use sql_assistant::error::{AssistantError, Result};
use sql_assistant::llm::SqlGenerator;
use sql_assistant::schema::{ColumnDescriptor, FieldOption, ForeignKey, QueryResult, SchemaInfo};
use sql_assistant::Assistant;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Deserialize)]
struct HrFixture {
    schema: SchemaInfo,
    rows: HashMap<String, Vec<Map<String, Value>>>,
}

/// Department/employee database held in memory.
pub struct MemoryDatabase {
    schema: SchemaInfo,
    rows: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    executed: Mutex<Vec<String>>,
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MemoryDatabase {
    /// Same tables and rows as the unit-test catalog.
    pub fn hr() -> Self {
        let fixture: HrFixture =
            serde_json::from_str(include_str!("../fixtures/hr.json")).expect("valid hr fixture");
        Self {
            schema: fixture.schema,
            rows: Mutex::new(fixture.rows),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.rows.lock().unwrap().get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Catalog for MemoryDatabase {
    async fn fetch(&self) -> Result<SchemaInfo> {
        Ok(self.schema.clone())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.schema.table(table).map(|t| t.columns.clone()).unwrap_or_default())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        Ok(self.schema.table(table).map(|t| t.foreign_keys.clone()).unwrap_or_default())
    }

    async fn reference_options(
        &self,
        foreign_key: &ForeignKey,
        display_column: &str,
    ) -> Result<Vec<FieldOption>> {
        let mut options: Vec<FieldOption> = self
            .rows(&foreign_key.referenced_table)
            .iter()
            .map(|row| FieldOption {
                id: row.get(&foreign_key.referenced_column).map(text).unwrap_or_default(),
                name: row.get(display_column).map(text).unwrap_or_default(),
            })
            .collect();
        options.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(options)
    }

    async fn referenced_ids(&self, table: &str, column: &str) -> Result<Vec<String>> {
        Ok(self
            .rows(table)
            .iter()
            .filter_map(|row| row.get(column).map(text))
            .collect())
    }
}

#[async_trait]
impl StatementExecutor for MemoryDatabase {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(QueryResult::Select {
            columns: vec!["name".to_string()],
            rows: self
                .rows("employee")
                .iter()
                .map(|row| vec![row.get("name").cloned().unwrap_or(Value::Null)])
                .collect(),
            row_count: self.rows("employee").len(),
            execution_time: 0.001,
        })
    }

    async fn insert_row(&self, table: &str, values: &Map<String, Value>) -> Result<Map<String, Value>> {
        let columns = self
            .schema
            .table(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| AssistantError::ExecutionError(format!("relation \"{}\" does not exist", table)))?;

        let mut rows = self.rows.lock().unwrap();
        let existing = rows.entry(table.to_string()).or_default();
        let mut row = Map::new();
        for column in &columns {
            let value = match values.get(&column.name) {
                Some(value) => value.clone(),
                None if column.default.is_some() => json!(existing.len() as i64 + 1),
                None if !column.nullable => {
                    return Err(AssistantError::ExecutionError(format!(
                        "null value in column \"{}\" violates not-null constraint",
                        column.name
                    )))
                }
                None => Value::Null,
            };
            row.insert(column.name.clone(), value);
        }
        existing.push(row.clone());
        Ok(row)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Generator answering with queued responses and remembering every prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(responses: &[&str]) -> Self {
        let generator = Self::default();
        for response in responses {
            generator.push(Ok(response.to_string()));
        }
        generator
    }

    pub fn push(&self, response: Result<String>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AssistantError::GenerationFailure("no scripted response".to_string())))
    }
}

pub fn assistant(database: &Arc<MemoryDatabase>, generator: &Arc<ScriptedGenerator>) -> Assistant {
    Assistant::new(
        database.clone(),
        database.clone(),
        generator.clone(),
        ConversationStore::default(),
    )
    .unwrap()
}
