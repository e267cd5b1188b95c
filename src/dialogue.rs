//! Slot-filling for guided inserts
//!
//! Works out which column of a table still needs a value and how to ask for
//! it. Nothing is stored here: every call re-reads the schema and looks only at
//! the values the caller passes in.

use crate::catalog::Catalog;
use crate::error::{AssistantError, Result};
use crate::schema::{ColumnDescriptor, FieldPrompt, ForeignKey};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

pub const SELECT_FIELD_TYPE: &str = "select";

/// Which column of a referenced table is shown to the user in option lists.
#[derive(Debug, Clone)]
pub struct DisplayColumns {
    overrides: HashMap<String, String>,
    fallback: String,
}

impl Default for DisplayColumns {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        overrides.insert("department".to_string(), "department_name".to_string());
        Self {
            overrides,
            fallback: "name".to_string(),
        }
    }
}

impl DisplayColumns {
    pub fn with_override(mut self, table: &str, column: &str) -> Self {
        self.overrides.insert(table.to_string(), column.to_string());
        self
    }

    pub fn for_table(&self, table: &str) -> &str {
        self.overrides
            .get(table)
            .map(String::as_str)
            .unwrap_or(self.fallback.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DialogueStateMachine {
    display_columns: DisplayColumns,
}

impl DialogueStateMachine {
    pub fn new(display_columns: DisplayColumns) -> Self {
        Self { display_columns }
    }

    /// The next field to ask for, or `None` once every collectable column has
    /// a value and the record can be inserted.
    pub async fn next_field(
        &self,
        catalog: &dyn Catalog,
        table: &str,
        collected: &Map<String, Value>,
    ) -> Result<Option<FieldPrompt>> {
        let columns = table_columns(catalog, table).await?;

        let Some(column) = columns
            .iter()
            .find(|c| requires_input(c) && !collected.contains_key(&c.name))
        else {
            debug!("All fields collected for {}", table);
            return Ok(None);
        };

        let foreign_keys = catalog.foreign_keys(table).await?;
        if let Some(fk) = foreign_keys.iter().find(|fk| fk.column == column.name) {
            return self.select_prompt(catalog, column, fk).await.map(Some);
        }

        Ok(Some(free_text_prompt(column)))
    }

    /// Fail if any collected key is not a column of `table`.
    pub async fn check_fields(
        &self,
        catalog: &dyn Catalog,
        table: &str,
        collected: &Map<String, Value>,
    ) -> Result<()> {
        let columns = table_columns(catalog, table).await?;
        for field in collected.keys() {
            if !columns.iter().any(|c| &c.name == field) {
                return Err(AssistantError::InvalidRequest(format!(
                    "'{}' is not a column of {}",
                    field, table
                )));
            }
        }
        Ok(())
    }

    async fn select_prompt(
        &self,
        catalog: &dyn Catalog,
        column: &ColumnDescriptor,
        fk: &ForeignKey,
    ) -> Result<FieldPrompt> {
        let display = self.display_columns.for_table(&fk.referenced_table);
        let options = catalog.reference_options(fk, display).await?;
        debug!(
            "{} references {}: {} options",
            column.name,
            fk.referenced_table,
            options.len()
        );

        Ok(FieldPrompt {
            field_name: column.name.clone(),
            field_type: SELECT_FIELD_TYPE.to_string(),
            prompt: format!("Please select a value for {}", humanize(&column.name)),
            max_length: None,
            options: Some(options),
        })
    }
}

async fn table_columns(catalog: &dyn Catalog, table: &str) -> Result<Vec<ColumnDescriptor>> {
    let columns = catalog.describe_columns(table).await?;
    if columns.is_empty() {
        return Err(AssistantError::InvalidRequest(format!("Unknown table: {}", table)));
    }
    Ok(columns)
}

/// Columns with a database default (serial keys, timestamps) are left to the database.
pub fn requires_input(column: &ColumnDescriptor) -> bool {
    column.default.is_none()
}

pub fn free_text_prompt(column: &ColumnDescriptor) -> FieldPrompt {
    let mut prompt = format!("Please provide a value for {}", humanize(&column.name));
    match column.data_type.as_str() {
        "character varying" => {
            if let Some(max) = column.max_length {
                prompt.push_str(&format!(" (max {} characters)", max));
            }
        }
        "date" => prompt.push_str(" (format: YYYY-MM-DD)"),
        _ if column.is_numeric() => prompt.push_str(" (numeric value)"),
        _ => {}
    }

    FieldPrompt {
        field_name: column.name.clone(),
        field_type: column.data_type.clone(),
        prompt,
        max_length: column.max_length,
        options: None,
    }
}

fn humanize(field: &str) -> String {
    field.replace('_', " ")
}
