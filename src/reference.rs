//! Referential checks on generated SQL
//!
//! Each enforced relationship is one [`ReferenceMatcher`]. A matcher pulls
//! literal identifiers for its key column out of the statement text and the
//! validator checks them against the live contents of the referenced table.
//! Adding a relationship means registering another matcher.

use crate::catalog::Catalog;
use crate::error::{AssistantError, Result};
use regex::Regex;
use tracing::{debug, warn};

lazy_static::lazy_static! {
    static ref INSERT_HEAD: Regex = Regex::new(
        r#"(?is)\binsert\s+into\s+((?:"[^"]+"|[\w$]+)(?:\s*\.\s*(?:"[^"]+"|[\w$]+))?)\s*(?:\(([^)]*)\))?\s*values\s*"#
    ).unwrap();
}

pub struct ReferenceMatcher {
    column: String,
    referenced_table: String,
    referenced_column: String,
    equality: Regex,
}

impl ReferenceMatcher {
    pub fn new(column: &str, referenced_table: &str, referenced_column: &str) -> Result<Self> {
        let escaped = regex::escape(column);
        let equality = Regex::new(&format!(r#"(?i)\b{}"?\s*=\s*'?(\d+)\b"#, escaped))
            .map_err(|e| AssistantError::Config(format!("Invalid matcher for {}: {}", column, e)))?;

        Ok(Self {
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
            equality,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn referenced_table(&self) -> &str {
        &self.referenced_table
    }

    /// Identifiers compared with `column = N`, quoted column names included.
    pub fn equality_ids(&self, sql: &str) -> Vec<String> {
        self.equality
            .captures_iter(sql)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Identifiers in the key column's slot of each `VALUES` tuple. The
    /// statement's column list must be known, either written out or resolved
    /// from the catalog.
    pub fn values_ids(&self, statement: &InsertStatement) -> Vec<String> {
        let Some(position) = statement
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(&self.column))
        else {
            return Vec::new();
        };

        statement
            .tuples
            .iter()
            .filter_map(|tuple| tuple.get(position))
            .filter_map(|item| integer_literal(item))
            .collect()
    }
}

/// The parts of an `INSERT ... VALUES` the matchers need.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    /// Column list, lower-cased and unquoted. Empty when the statement omits
    /// it and it has not been resolved yet.
    pub columns: Vec<String>,
    pub tuples: Vec<Vec<String>>,
}

/// Locate every `INSERT INTO t (cols) VALUES (...), (...)` in the text.
pub fn find_inserts(sql: &str) -> Vec<InsertStatement> {
    INSERT_HEAD
        .captures_iter(sql)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let table = caps[1]
                .rsplit('.')
                .next()
                .map(unquote)
                .unwrap_or_default();
            let columns = caps
                .get(2)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(unquote)
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            let tuples = split_tuples(&sql[whole.end()..]);
            Some(InsertStatement { table, columns, tuples })
        })
        .collect()
}

fn unquote(identifier: &str) -> String {
    identifier.trim().trim_matches('"').to_lowercase()
}

/// Split `(a, b), (c, d) ...` into items, honouring quotes and nested parens.
/// Stops at the first token after the tuple list (`RETURNING`, `;`, ...).
fn split_tuples(text: &str) -> Vec<Vec<String>> {
    let mut tuples = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut item = String::new();
    let mut depth = 0usize;
    let mut in_quote = false;

    for ch in text.chars() {
        if in_quote {
            item.push(ch);
            if ch == '\'' {
                in_quote = false;
            }
            continue;
        }
        match ch {
            '\'' if depth > 0 => {
                in_quote = true;
                item.push(ch);
            }
            '(' => {
                if depth > 0 {
                    item.push(ch);
                }
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    current.push(item.trim().to_string());
                    item.clear();
                    tuples.push(std::mem::take(&mut current));
                } else {
                    item.push(ch);
                }
            }
            ',' if depth == 1 => {
                current.push(item.trim().to_string());
                item.clear();
            }
            _ if depth > 0 => item.push(ch),
            c if c == ',' || c.is_whitespace() => {}
            _ => break,
        }
    }
    tuples
}

/// `42` or `'42'` → `42`; anything else is not an identifier literal.
fn integer_literal(item: &str) -> Option<String> {
    let literal = item.trim().trim_matches('\'');
    if !literal.is_empty() && literal.chars().all(|c| c.is_ascii_digit()) {
        Some(literal.to_string())
    } else {
        None
    }
}

fn normalize_id(id: &str) -> String {
    let trimmed = id.trim();
    trimmed
        .parse::<i64>()
        .map(|n| n.to_string())
        .unwrap_or_else(|_| trimmed.to_string())
}

pub struct ReferenceValidator {
    matchers: Vec<ReferenceMatcher>,
}

impl Default for ReferenceValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceValidator {
    /// Validator with no registered relationships.
    pub fn new() -> Self {
        Self { matchers: Vec::new() }
    }

    /// Validator enforcing employee → department references.
    pub fn with_defaults() -> Result<Self> {
        let mut validator = Self::new();
        validator.register(ReferenceMatcher::new("dept_id", "department", "dept_id")?);
        Ok(validator)
    }

    pub fn register(&mut self, matcher: ReferenceMatcher) {
        self.matchers.push(matcher);
    }

    pub fn matchers(&self) -> &[ReferenceMatcher] {
        &self.matchers
    }

    /// Reject the statement if it cites an identifier missing from its
    /// referenced table. An empty referenced table rejects every identifier.
    pub async fn validate(&self, sql: &str, catalog: &dyn Catalog) -> Result<()> {
        if self.matchers.is_empty() {
            return Ok(());
        }

        let mut inserts = find_inserts(sql);
        for insert in inserts.iter_mut().filter(|i| i.columns.is_empty()) {
            insert.columns = resolve_columns(catalog, &insert.table).await?;
        }

        for matcher in &self.matchers {
            let mut candidates = matcher.equality_ids(sql);
            for insert in &inserts {
                candidates.extend(matcher.values_ids(insert));
            }
            if candidates.is_empty() {
                continue;
            }

            let valid_ids = catalog
                .referenced_ids(&matcher.referenced_table, &matcher.referenced_column)
                .await?;

            let mut seen = Vec::new();
            for candidate in candidates {
                let id = normalize_id(&candidate);
                if seen.contains(&id) {
                    continue;
                }
                if !valid_ids.iter().any(|v| normalize_id(v) == id) {
                    warn!(
                        "Rejected statement: {} {} not found in {}",
                        matcher.column, id, matcher.referenced_table
                    );
                    return Err(AssistantError::ReferenceViolation {
                        column: matcher.column.clone(),
                        referenced_table: matcher.referenced_table.clone(),
                        value: id,
                        valid_ids,
                    });
                }
                seen.push(id);
            }
            debug!("{} references verified: {:?}", matcher.column, seen);
        }
        Ok(())
    }
}

/// Table columns in declaration order, for inserts that omit the list.
async fn resolve_columns(catalog: &dyn Catalog, table: &str) -> Result<Vec<String>> {
    let columns = catalog.describe_columns(table).await?;
    if columns.is_empty() {
        warn!("Rejected statement: cannot resolve the columns of {}", table);
        return Err(AssistantError::InvalidRequest(format!(
            "Cannot check INSERT INTO {} without a column list: unknown table",
            table
        )));
    }
    Ok(columns.into_iter().map(|c| c.name.to_lowercase()).collect())
}
