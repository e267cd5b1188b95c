//! Request orchestration
//!
//! [`Assistant`] wires the catalog, generator, validator and executor into
//! the two request paths. An "add a new <table>" request opens a guided
//! insert conversation. Anything else goes through
//! schema → prompt → generation → extraction → reference check → execution,
//! and a statement that fails the reference check is never executed.

use crate::api::{
    FieldPromptResponse, FieldPromptsRequest, FinalizeResponse, QueryRequest, QueryResponse,
    StatusResponse,
};
use crate::catalog::Catalog;
use crate::conversation::{new_conversation_id, ConversationStore};
use crate::db::StatementExecutor;
use crate::dialogue::DialogueStateMachine;
use crate::error::{AssistantError, Result};
use crate::extract::extract_sql;
use crate::intent::IntentClassifier;
use crate::llm::SqlGenerator;
use crate::prompt;
use crate::reference::ReferenceValidator;
use crate::schema::SchemaInfo;
use chrono::Utc;
use serde_json::Map;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Assistant {
    catalog: Arc<dyn Catalog>,
    executor: Arc<dyn StatementExecutor>,
    generator: Arc<dyn SqlGenerator>,
    conversations: ConversationStore,
    validator: ReferenceValidator,
    intents: IntentClassifier,
    dialogue: DialogueStateMachine,
}

impl Assistant {
    /// Assistant with the default reference checks and insert intents.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        executor: Arc<dyn StatementExecutor>,
        generator: Arc<dyn SqlGenerator>,
        conversations: ConversationStore,
    ) -> Result<Self> {
        Ok(Self {
            catalog,
            executor,
            generator,
            conversations,
            validator: ReferenceValidator::with_defaults()?,
            intents: IntentClassifier::with_defaults()?,
            dialogue: DialogueStateMachine::default(),
        })
    }

    pub fn with_validator(mut self, validator: ReferenceValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_intents(mut self, intents: IntentClassifier) -> Self {
        self.intents = intents;
        self
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub async fn fetch_schema(&self) -> Result<SchemaInfo> {
        let schema = self.catalog.fetch().await?;
        info!("Schema loaded: {} tables", schema.tables.len());
        Ok(schema)
    }

    pub async fn handle_query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let user_request = request.user_request.trim();
        if user_request.is_empty() {
            return Err(AssistantError::InvalidRequest("userRequest must not be empty".to_string()));
        }
        info!("Handling query: {}", user_request);

        if let Some(table) = self.intents.detect(user_request) {
            return self.start_insert(table).await;
        }

        let schema = self.fetch_schema().await?;
        let prior_context = request.prior_context.as_deref().unwrap_or(&[]);
        let prompt = prompt::compose(&schema, user_request, prior_context);

        let generated = self.generator.generate(&prompt).await?;
        let sql = extract_sql(&generated);
        if sql.is_empty() {
            return Err(AssistantError::GenerationFailure("Generator returned no SQL".to_string()));
        }
        info!("Generated SQL: {}", sql);

        self.validator.validate(&sql, self.catalog.as_ref()).await?;

        let result = self.executor.execute(&sql).await?;
        info!(
            "Executed in {:.3}s, {} rows",
            result.execution_time(),
            result.row_count()
        );

        Ok(QueryResponse::Success {
            generated_sql: sql,
            execution_result: result,
            schema,
            timestamp: Utc::now(),
        })
    }

    async fn start_insert(&self, table: &str) -> Result<QueryResponse> {
        let prompt = self
            .dialogue
            .next_field(self.catalog.as_ref(), table, &Map::new())
            .await?
            .ok_or_else(|| {
                warn!("No fields to collect for {}", table);
                AssistantError::InvalidRequest(format!("No fields to collect for {}.", table))
            })?;

        let conversation_id = new_conversation_id();
        self.conversations.create(&conversation_id, table);

        Ok(QueryResponse::Incomplete {
            conversation_id,
            table_name: table.to_string(),
            message: format!("Let's add a new {}. I'll help you fill in the details.", table),
            prompt,
        })
    }

    /// Record the supplied values and return the next prompt, or the full set
    /// of values once nothing is missing.
    pub async fn next_field_prompt(&self, request: &FieldPromptsRequest) -> Result<FieldPromptResponse> {
        let table = request.table_name.as_str();
        let supplied = request.collected_values.clone().unwrap_or_default();

        self.dialogue
            .check_fields(self.catalog.as_ref(), table, &supplied)
            .await?;

        let state = self
            .conversations
            .upsert(&request.conversation_id, table, &supplied)?;
        debug!(
            "Conversation {} has {} values",
            request.conversation_id,
            state.collected_values.len()
        );

        match self
            .dialogue
            .next_field(self.catalog.as_ref(), table, &state.collected_values)
            .await?
        {
            Some(prompt) => Ok(FieldPromptResponse::Incomplete { prompt }),
            None => Ok(FieldPromptResponse::Complete {
                message: format!("All fields collected for {}.", table),
                collected_values: state.collected_values,
            }),
        }
    }

    /// Insert the collected record. The conversation is kept if the insert fails.
    pub async fn finalize_insert(&self, conversation_id: &str) -> Result<FinalizeResponse> {
        let (table, values) = self.conversations.finalize(conversation_id)?;

        match self.executor.insert_row(&table, &values).await {
            Ok(inserted_row) => {
                info!("Inserted into {} for conversation {}", table, conversation_id);
                Ok(FinalizeResponse {
                    status: "success",
                    message: format!("Successfully inserted into {}.", table),
                    inserted_row,
                })
            }
            Err(e) => {
                warn!("Insert into {} failed, keeping conversation {}", table, conversation_id);
                if let Err(restore_err) = self.conversations.upsert(conversation_id, &table, &values) {
                    warn!("Could not restore conversation {}: {}", conversation_id, restore_err);
                }
                Err(e)
            }
        }
    }

    pub async fn health_check(&self) -> Result<StatusResponse> {
        self.executor.ping().await?;
        Ok(StatusResponse {
            status: "healthy",
            message: "Service is running".to_string(),
        })
    }
}
