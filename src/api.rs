//! Request and response bodies of the HTTP interface

use crate::error::AssistantError;
use crate::schema::{FieldPrompt, QueryResult, SchemaInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(alias = "user_query")]
    pub user_request: String,
    /// Earlier turns of the conversation, passed to the generator verbatim.
    #[serde(default, alias = "previous_context")]
    pub prior_context: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPromptsRequest {
    #[serde(alias = "table_name")]
    pub table_name: String,
    #[serde(alias = "conversation_id")]
    pub conversation_id: String,
    #[serde(default, alias = "current_values")]
    pub collected_values: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    #[serde(alias = "conversation_id")]
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryResponse {
    #[serde(rename_all = "camelCase")]
    Incomplete {
        conversation_id: String,
        table_name: String,
        message: String,
        prompt: FieldPrompt,
    },
    #[serde(rename_all = "camelCase")]
    Success {
        #[serde(rename = "generatedSQL")]
        generated_sql: String,
        execution_result: QueryResult,
        schema: SchemaInfo,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FieldPromptResponse {
    #[serde(rename_all = "camelCase")]
    Complete {
        message: String,
        collected_values: Map<String, Value>,
    },
    Incomplete { prompt: FieldPrompt },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub status: &'static str,
    pub message: String,
    pub inserted_row: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaResponse {
    pub status: &'static str,
    pub schema: SchemaInfo,
}

/// Body of `/health` and `/`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: &'static str,
    pub detail: String,
}

impl From<&AssistantError> for ErrorResponse {
    fn from(err: &AssistantError) -> Self {
        Self {
            status: "error",
            error: err.kind(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_request_accepts_both_spellings() {
        let camel: QueryRequest = serde_json::from_value(json!({"userRequest": "list departments"})).unwrap();
        assert_eq!(camel.user_request, "list departments");
        assert!(camel.prior_context.is_none());

        let snake: QueryRequest = serde_json::from_value(json!({
            "user_query": "list departments",
            "previous_context": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(snake.prior_context.unwrap().len(), 1);
    }

    #[test]
    fn test_incomplete_query_response_shape() {
        let response = QueryResponse::Incomplete {
            conversation_id: "conv-1".to_string(),
            table_name: "department".to_string(),
            message: "Let's add a new department.".to_string(),
            prompt: FieldPrompt {
                field_name: "department_name".to_string(),
                field_type: "character varying".to_string(),
                prompt: "Please provide a value for department name".to_string(),
                max_length: Some(100),
                options: None,
            },
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "incomplete");
        assert_eq!(value["conversationId"], "conv-1");
        assert_eq!(value["tableName"], "department");
        assert_eq!(value["prompt"]["field_name"], "department_name");
    }

    #[test]
    fn test_success_query_response_shape() {
        let response = QueryResponse::Success {
            generated_sql: "DELETE FROM employee".to_string(),
            execution_result: QueryResult::Modification {
                row_count: 2,
                execution_time: 0.01,
                message: "Query executed successfully".to_string(),
            },
            schema: SchemaInfo::default(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["generatedSQL"], "DELETE FROM employee");
        assert_eq!(value["executionResult"]["row_count"], 2);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_error_response_from_error() {
        let err = AssistantError::ConversationNotFound("conv-9".to_string());
        let value = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(value, json!({
            "status": "error",
            "error": "ConversationNotFound",
            "detail": "Conversation not found: conv-9"
        }));
    }
}
