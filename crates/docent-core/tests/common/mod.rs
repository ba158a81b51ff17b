//! Shared fixtures: stub chat backends and a seeded in-memory store

#![allow(dead_code)]

use async_trait::async_trait;
use docent_core::llm::{ChatBackend, ChatMessage, ChatResponse, ProviderGateway, ProviderPreference};
use docent_core::{
    DocentError, DocumentIndexer, DocumentInput, HashEmbedder, Result, SqliteVectorStore,
    VectorStore,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WFH_ROLLBACK_QUERY: &str =
    "Can I work from home on Fridays, and how do I roll back a failed deployment?";

/// Answers each pipeline prompt with a canned reply, keyed off the system prompt
pub struct PromptStub {
    pub intent: String,
    pub split: Option<String>,
    pub rewrite: Option<String>,
    pub summary: Option<String>,
    pub suggestions: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl PromptStub {
    pub fn new(intent: &str) -> Self {
        Self {
            intent: intent.to_string(),
            split: None,
            rewrite: None,
            summary: None,
            suggestions: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_split(mut self, json: &str) -> Self {
        self.split = Some(json.to_string());
        self
    }

    pub fn with_rewrite(mut self, text: &str) -> Self {
        self.rewrite = Some(text.to_string());
        self
    }

    pub fn with_summary(mut self, text: &str) -> Self {
        self.summary = Some(text.to_string());
        self
    }

    pub fn with_suggestions(mut self, text: &str) -> Self {
        self.suggestions = Some(text.to_string());
        self
    }

    /// Purposes seen so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn purpose(system: &str) -> &'static str {
        if system.contains("intent classifier") {
            "intent"
        } else if system.contains("one search query per document category") {
            "split"
        } else if system.contains("normalize employee questions") {
            "rewrite"
        } else if system.contains("matched no documents") {
            "followup"
        } else {
            "summary"
        }
    }
}

#[async_trait]
impl ChatBackend for PromptStub {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _provider: Option<&str>,
        _model: Option<&str>,
    ) -> Result<ChatResponse> {
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        let purpose = Self::purpose(system);
        self.calls.lock().unwrap().push(purpose.to_string());

        let reply = match purpose {
            "intent" => Some(self.intent.clone()),
            "split" => self.split.clone(),
            "rewrite" => self.rewrite.clone(),
            "followup" => self.suggestions.clone(),
            _ => self.summary.clone(),
        };

        reply
            .map(|content| ChatResponse::new(content, Some("stub".to_string())))
            .ok_or_else(|| DocentError::Llm(format!("{} unavailable", purpose)))
    }
}

/// Fails with a rate limit a fixed number of times per provider, then answers
pub struct FlakyBackend {
    failures: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<String>>,
}

impl FlakyBackend {
    pub fn new(failures: &[(&str, usize)]) -> Self {
        Self {
            failures: Mutex::new(
                failures
                    .iter()
                    .map(|(p, n)| (p.to_string(), *n))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, provider: &str) -> usize {
        self.calls().iter().filter(|c| *c == provider).count()
    }
}

#[async_trait]
impl ChatBackend for FlakyBackend {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        provider: Option<&str>,
        _model: Option<&str>,
    ) -> Result<ChatResponse> {
        let name = provider.unwrap_or("default").to_string();
        self.calls.lock().unwrap().push(name.clone());

        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(DocentError::RateLimited(format!("{}: HTTP 429", name)))
            }
            Some(_) => Ok(ChatResponse::new(format!("answer from {}", name), None)),
            None => Err(DocentError::Llm(format!("{} is down", name))),
        }
    }
}

/// Sleeps before answering, for deadline tests
pub struct SlowBackend(pub Duration);

#[async_trait]
impl ChatBackend for SlowBackend {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _provider: Option<&str>,
        _model: Option<&str>,
    ) -> Result<ChatResponse> {
        tokio::time::sleep(self.0).await;
        Ok(ChatResponse::new("policy", None))
    }
}

/// Two-entry chain used by most tests
pub fn two_model_chain() -> Vec<ProviderPreference> {
    vec![
        ProviderPreference::new(Some("gemini"), "gemini:gemini-2.5-flash", Some("gemini-2.5-flash")),
        ProviderPreference::new(Some("openai"), "openai:gpt-4o-mini", Some("gpt-4o-mini")),
    ]
}

pub fn gateway(backend: Arc<dyn ChatBackend>) -> Arc<ProviderGateway> {
    Arc::new(ProviderGateway::new(backend, two_model_chain()))
}

/// In-memory store with two policy and two ops documents
pub async fn seeded_store() -> Arc<dyn VectorStore> {
    let store: Arc<dyn VectorStore> = Arc::new(
        SqliteVectorStore::open_in_memory("chatbot_documents", Arc::new(HashEmbedder::new(256)))
            .unwrap(),
    );
    let indexer = DocumentIndexer::new(store.clone(), 32);

    let docs = [
        (
            "remote-work.md",
            "policy",
            "# Remote work\nEmployees may work from home up to two days per week, including Fridays, with manager approval.",
        ),
        (
            "leave.md",
            "policy",
            "# Annual leave\nFull-time employees receive twelve days of paid annual leave per year.",
        ),
        (
            "rollback.md",
            "ops",
            "# Deployment rollback\nTo roll back a failed deployment, run the release tool with the previous tag and verify health checks.",
        ),
        (
            "oncall.md",
            "ops",
            "# On-call\nThe on-call engineer acknowledges pages within fifteen minutes.",
        ),
    ];

    for (filename, document_type, text) in docs {
        indexer
            .index_document(&DocumentInput {
                document_id: docent_core::ingest::document_id_for(filename, document_type),
                filename: filename.to_string(),
                document_type: document_type.to_string(),
                uploaded_by: Some("admin".to_string()),
                text: text.to_string(),
            })
            .await
            .unwrap();
    }

    store
}
