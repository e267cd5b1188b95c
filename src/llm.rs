//! SQL generation backends
//!
//! The assistant only needs "prompt in, text out". Two backends implement
//! [`SqlGenerator`]: a local model run as a child process (`ollama run`), and
//! an OpenAI-compatible chat completions endpoint. Both are bounded by the
//! configured generation timeout.

use crate::config::{GeneratorBackend, GeneratorConfig};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Raw generator output for `prompt`; may still contain fences or prose.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub fn from_config(config: &GeneratorConfig) -> Result<Arc<dyn SqlGenerator>> {
    match config.backend {
        GeneratorBackend::Ollama => Ok(Arc::new(CommandGenerator::new(
            &config.command,
            &config.model,
            config.timeout,
        ))),
        GeneratorBackend::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                AssistantError::Config("OPENAI_API_KEY is required for the openai backend".to_string())
            })?;
            Ok(Arc::new(OpenAiGenerator::new(
                api_key,
                &config.base_url,
                &config.model,
                config.timeout,
            )?))
        }
    }
}

/// Runs `<command> run <model> <prompt>` and returns its stdout.
pub struct CommandGenerator {
    command: String,
    model: String,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(command: &str, model: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            model: model.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl SqlGenerator for CommandGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Running {} run {} ({} byte prompt)", self.command, self.model, prompt.len());

        let child = Command::new(&self.command)
            .arg("run")
            .arg(&self.model)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result.map_err(|e| {
                AssistantError::GenerationFailure(format!("Failed to start {}: {}", self.command, e))
            })?,
            Err(_) => {
                warn!("Generation timed out after {:?}", self.timeout);
                return Err(AssistantError::GenerationFailure(format!(
                    "Generation timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AssistantError::GenerationFailure(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        if text.trim().is_empty() {
            return Err(AssistantError::GenerationFailure("Generator returned no output".to_string()));
        }
        info!("Generator produced {} bytes", text.len());
        Ok(text)
    }
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl SqlGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a PostgreSQL expert. Respond with a single SQL statement."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
            "max_tokens": 1000
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::GenerationFailure(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::GenerationFailure(format!(
                "LLM API returned {}: {}",
                status, detail
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::GenerationFailure(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AssistantError::GenerationFailure("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}
