//! Conversation persistence and the chat entry point

use crate::error::{DocentError, Result};
use crate::llm::Role;
use crate::pipeline::{RagPipeline, RunOutcome, RunRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Reply stored when the pipeline has no answer
pub const APOLOGY: &str = "Sorry, I can't answer this question right now.";

/// Provider label stored with the apology
pub const PIPELINE_ERROR_PROVIDER: &str = "pipeline-error";

/// Messages fetched as context for each turn
pub const HISTORY_LIMIT: usize = 10;

/// A persisted conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence the chat service needs from the surrounding application
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Most recent messages, oldest first
    async fn recent_messages(&self, conversation_id: &str, limit: usize)
        -> Result<Vec<StoredMessage>>;

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        provider: Option<&str>,
    ) -> Result<StoredMessage>;
}

/// Process-local conversation store
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let conversations = self
            .conversations
            .lock()
            .map_err(|_| DocentError::Store("conversation lock poisoned".to_string()))?;
        let messages = conversations
            .get(conversation_id)
            .map(|m| {
                let skip = m.len().saturating_sub(limit);
                m[skip..].to_vec()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        provider: Option<&str>,
    ) -> Result<StoredMessage> {
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            provider: provider.map(str::to_string),
            created_at: Utc::now(),
        };
        self.conversations
            .lock()
            .map_err(|_| DocentError::Store("conversation lock poisoned".to_string()))?
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }
}

/// Render history as `User:` / `Assistant:` lines
pub fn format_history(messages: &[StoredMessage]) -> String {
    if messages.is_empty() {
        return "No previous conversation.".to_string();
    }
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                _ => "Assistant",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result of one chat turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub provider_used: String,
    pub user_message: StoredMessage,
    pub assistant_message: StoredMessage,
    pub outcome: RunOutcome,
}

/// Runs the pipeline for a conversation turn and persists both sides
pub struct ChatService {
    pipeline: Arc<RagPipeline>,
    store: Arc<dyn ConversationStore>,
}

impl ChatService {
    pub fn new(pipeline: Arc<RagPipeline>, store: Arc<dyn ConversationStore>) -> Self {
        Self { pipeline, store }
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        username: &str,
        message: &str,
        top_k: usize,
    ) -> Result<ChatReply> {
        if message.trim().is_empty() {
            return Err(DocentError::InvalidInput("message must not be empty".to_string()));
        }

        let history = self.store.recent_messages(conversation_id, HISTORY_LIMIT).await?;
        tracing::debug!(
            "Conversation {} history:\n{}",
            conversation_id,
            format_history(&history)
        );

        let outcome = self
            .pipeline
            .run(
                RunRequest::new(message, username)
                    .with_top_k(top_k)
                    .with_rewrite(true),
            )
            .await;

        let (response, provider_used) = match &outcome {
            RunOutcome::Answered(result) => (result.response.clone(), result.provider_used.clone()),
            RunOutcome::NoAnswer(no_answer) => {
                tracing::warn!(
                    "Pipeline returned no answer ({}), sending apology",
                    no_answer.error
                );
                (APOLOGY.to_string(), PIPELINE_ERROR_PROVIDER.to_string())
            }
        };

        let user_message = self
            .store
            .append_message(conversation_id, Role::User, message, None)
            .await?;
        let assistant_message = self
            .store
            .append_message(conversation_id, Role::Assistant, &response, Some(&provider_used))
            .await?;

        Ok(ChatReply {
            response,
            provider_used,
            user_message,
            assistant_message,
            outcome,
        })
    }
}
