//! Data model shared by the catalog, dialogue and executor layers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Live snapshot of the database structure, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaInfo {
    pub tables: BTreeMap<String, TableSchema>,
}

impl SchemaInfo {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            max_length: None,
            default: None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "integer" | "smallint" | "bigint" | "numeric" | "real" | "double precision"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl ForeignKey {
    pub fn new(column: &str, referenced_table: &str, referenced_column: &str) -> Self {
        Self {
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
        }
    }
}

/// One selectable row of a referenced table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub name: String,
}

/// What the caller should ask the user for next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPrompt {
    pub field_name: String,
    pub field_type: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldOption>>,
}

/// Outcome of running a single statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryResult {
    Select {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        row_count: usize,
        execution_time: f64,
    },
    Modification {
        row_count: u64,
        execution_time: f64,
        message: String,
    },
}

impl QueryResult {
    pub fn row_count(&self) -> u64 {
        match self {
            QueryResult::Select { row_count, .. } => *row_count as u64,
            QueryResult::Modification { row_count, .. } => *row_count,
        }
    }

    pub fn execution_time(&self) -> f64 {
        match self {
            QueryResult::Select { execution_time, .. }
            | QueryResult::Modification { execution_time, .. } => *execution_time,
        }
    }
}
