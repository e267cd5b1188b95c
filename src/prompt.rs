//! Generation prompt assembly
//!
//! Pure string building: the same schema, request and context always yield
//! the same prompt text.

use crate::schema::SchemaInfo;
use serde_json::Value;

/// Render the schema as one block per table: a header line, one line per
/// column, one line per foreign key, then a blank separator line.
pub fn format_schema(schema: &SchemaInfo) -> String {
    let mut lines = Vec::new();
    for (table, info) in &schema.tables {
        lines.push(format!("Table: {}", table));
        for column in &info.columns {
            lines.push(format!("- {} ({})", column.name, column.data_type));
        }
        for fk in &info.foreign_keys {
            lines.push(format!(
                "- FK: {} references {}.{}",
                fk.column, fk.referenced_table, fk.referenced_column
            ));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

fn format_prior_context(prior_context: &[Value]) -> Option<String> {
    if prior_context.is_empty() {
        return None;
    }
    let turns: Vec<String> = prior_context
        .iter()
        .map(|turn| match turn {
            Value::String(text) => format!("- {}", text),
            other => format!("- {}", other),
        })
        .collect();
    Some(turns.join("\n"))
}

/// Build the full generation request for `user_request`.
pub fn compose(schema: &SchemaInfo, user_request: &str, prior_context: &[Value]) -> String {
    let context = match format_prior_context(prior_context) {
        Some(turns) => format!("Previous conversation:\n{}\n\n", turns),
        None => String::new(),
    };

    format!(
        r#"Database Schema:
{schema}
Important Constraints:
- All foreign key references must exist in their respective tables
- Never invent ID values - use only existing IDs
- For department IDs, verify they exist in department table first

{context}Task: Convert this to valid PostgreSQL: {request}

Requirements:
- Return ONLY the SQL query without any explanations
- Must respect all database constraints
- Use proper syntax for the operation type
- Include all necessary clauses

SQL Query:
"#,
        schema = format_schema(schema),
        context = context,
        request = user_request.trim(),
    )
}
