//! Natural-language to SQL assistant for a PostgreSQL database.
//!
//! Free-form requests are turned into SQL by a language model, checked
//! against live reference data and executed. "Add a new <table>" requests are
//! handled as a guided, field-by-field insert instead.

pub mod api;
pub mod assistant;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod db;
pub mod dialogue;
pub mod error;
pub mod extract;
pub mod http;
pub mod intent;
pub mod llm;
pub mod prompt;
pub mod reference;
pub mod schema;

#[cfg(test)]
mod test_support;

pub use assistant::Assistant;
pub use error::{AssistantError, Result};
