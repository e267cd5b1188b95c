//! Recognises "add a new <table>" requests that start a guided insert

use crate::error::{AssistantError, Result};
use regex::Regex;
use tracing::debug;

pub struct IntentClassifier {
    patterns: Vec<(String, Regex)>,
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self { patterns: Vec::new() }
    }

    /// Classifier recognising new employees and departments.
    pub fn with_defaults() -> Result<Self> {
        let mut classifier = Self::new();
        classifier.register_table("employee")?;
        classifier.register_table("department")?;
        Ok(classifier)
    }

    /// Recognise `add|create [a|an] [new] <table>[s]` for another table.
    pub fn register_table(&mut self, table: &str) -> Result<()> {
        let pattern = format!(
            r"\b(?:add|create)\s+(?:(?:a|an)\s+)?(?:new\s+)?{}s?\b",
            regex::escape(&table.to_lowercase())
        );
        self.register(table, &pattern)
    }

    pub fn register(&mut self, table: &str, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern)
            .map_err(|e| AssistantError::Config(format!("Invalid intent pattern for {}: {}", table, e)))?;
        self.patterns.push((table.to_string(), regex));
        Ok(())
    }

    /// The table the request wants a new record in, if any.
    pub fn detect(&self, user_request: &str) -> Option<&str> {
        let lowered = user_request.to_lowercase();
        let table = self
            .patterns
            .iter()
            .find(|(_, regex)| regex.is_match(&lowered))
            .map(|(table, _)| table.as_str());
        if let Some(table) = table {
            debug!("Insert intent detected for {}", table);
        }
        table
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_insert_requests() {
        let classifier = IntentClassifier::with_defaults().unwrap();
        assert_eq!(classifier.detect("Add a new department"), Some("department"));
        assert_eq!(classifier.detect("create new employee please"), Some("employee"));
        assert_eq!(classifier.detect("I want to ADD EMPLOYEE"), Some("employee"));
        assert_eq!(classifier.detect("create an  employee"), Some("employee"));
    }

    #[test]
    fn test_detects_plural_table_names() {
        let classifier = IntentClassifier::with_defaults().unwrap();
        assert_eq!(classifier.detect("add new employees"), Some("employee"));
        assert_eq!(classifier.detect("Create departments"), Some("department"));
        assert_eq!(classifier.detect("add new employeesheet"), None);
    }

    #[test]
    fn test_ignores_other_requests() {
        let classifier = IntentClassifier::with_defaults().unwrap();
        assert_eq!(classifier.detect("show all employees in department 3"), None);
        assert_eq!(classifier.detect("how many departments were added last year"), None);
        assert_eq!(classifier.detect("add a new departmental budget"), None);
    }

    #[test]
    fn test_registered_tables() {
        let mut classifier = IntentClassifier::with_defaults().unwrap();
        classifier.register_table("Project").unwrap();
        assert_eq!(classifier.detect("create a new project"), Some("Project"));
        assert!(classifier.register("broken", "(").is_err());
    }
}
