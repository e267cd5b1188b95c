use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Database unavailable: {0}")]
    StorageUnavailable(String),

    #[error("SQL generation failed: {0}")]
    GenerationFailure(String),

    #[error("{referenced_table} {column} {value} does not exist. Valid IDs: {}", .valid_ids.join(", "))]
    ReferenceViolation {
        column: String,
        referenced_table: String,
        value: String,
        valid_ids: Vec<String>,
    },

    #[error("Query execution failed: {0}")]
    ExecutionError(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssistantError {
    /// Stable machine-readable name used in error response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::StorageUnavailable(_) => "StorageUnavailable",
            AssistantError::GenerationFailure(_) => "GenerationFailure",
            AssistantError::ReferenceViolation { .. } => "ReferenceViolation",
            AssistantError::ExecutionError(_) => "ExecutionError",
            AssistantError::ConversationNotFound(_) => "ConversationNotFound",
            AssistantError::InvalidRequest(_) | AssistantError::Json(_) => "InvalidRequest",
            AssistantError::Config(_) | AssistantError::Io(_) => "InternalError",
        }
    }

    /// HTTP status the transport layer reports for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            AssistantError::StorageUnavailable(_) => 503,
            AssistantError::GenerationFailure(_) => 502,
            AssistantError::ReferenceViolation { .. } => 400,
            AssistantError::ExecutionError(_) => 500,
            AssistantError::ConversationNotFound(_) => 404,
            AssistantError::InvalidRequest(_) | AssistantError::Json(_) => 400,
            AssistantError::Config(_) | AssistantError::Io(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
