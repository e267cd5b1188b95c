//! Runtime configuration
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file by the binary). Anything not set falls back to a local-development default.

use crate::error::{AssistantError, Result};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_GENERATOR_MODEL: &str = "SqlGenerator";
const DEFAULT_GENERATOR_COMMAND: &str = "ollama";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONVERSATION_TTL_SECS: u64 = 1800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorBackend {
    /// Local `ollama run <model> <prompt>` process.
    Ollama,
    /// OpenAI-compatible chat completions endpoint.
    OpenAi,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Full connection string; takes precedence over the individual fields.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
    pub model: String,
    pub command: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database: DatabaseConfig,
    pub generator: GeneratorConfig,
    pub conversation_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build the configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = parse_number::<u16>(get("DB_PORT"), "DB_PORT", 5432)?;
        let database = DatabaseConfig {
            host: get_or("DB_HOST", "localhost"),
            port,
            database: get_or("DB_NAME", "postgres"),
            user: get_or("DB_USER", "postgres"),
            password: get_or("DB_PASSWORD", ""),
            url: get("DATABASE_URL"),
        };

        let backend = match get_or("GENERATOR_BACKEND", "ollama").to_lowercase().as_str() {
            "ollama" => GeneratorBackend::Ollama,
            "openai" => GeneratorBackend::OpenAi,
            other => {
                return Err(AssistantError::Config(format!(
                    "Unknown GENERATOR_BACKEND '{}' (expected 'ollama' or 'openai')",
                    other
                )))
            }
        };

        let timeout_secs = parse_number::<u64>(
            get("GENERATION_TIMEOUT_SECS"),
            "GENERATION_TIMEOUT_SECS",
            DEFAULT_GENERATION_TIMEOUT_SECS,
        )?;
        let generator = GeneratorConfig {
            backend,
            model: get_or("GENERATOR_MODEL", DEFAULT_GENERATOR_MODEL),
            command: get_or("GENERATOR_COMMAND", DEFAULT_GENERATOR_COMMAND),
            api_key: get("OPENAI_API_KEY"),
            base_url: get_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            timeout: Duration::from_secs(timeout_secs),
        };

        let ttl_secs = parse_number::<u64>(
            get("CONVERSATION_TTL_SECS"),
            "CONVERSATION_TTL_SECS",
            DEFAULT_CONVERSATION_TTL_SECS,
        )?;

        Ok(Self {
            bind_addr: get_or("BIND_ADDR", DEFAULT_BIND_ADDR),
            database,
            generator,
            conversation_ttl: Duration::from_secs(ttl_secs),
        })
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AssistantError::Config(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(default),
    }
}
