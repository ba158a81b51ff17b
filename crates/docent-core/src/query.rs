//! Query preprocessing: rewrite, intent classification, per-category split
//!
//! Every step degrades to a safe default when the model is unavailable or its
//! output cannot be parsed. Nothing here returns an error.

use crate::llm::{ChatMessage, ProviderGateway};
use crate::planner::{OPS_TOOL, POLICY_TOOL};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[a-zA-Z0-9_-]*\s*(.*?)\s*```").unwrap();
}

const REWRITE_PROMPT: &str = "You normalize employee questions so internal documents are easy to search. \
Rephrase the question concisely, keep every main point, and use clear keywords. \
Return only the normalized question.";

const INTENT_PROMPT: &str = "You are an intent classifier. List ALL intents that apply from the classes below, \
separated by commas:\n\
- policy: questions about policies, benefits, HR, remote work, leave...\n\
- ops: questions about operations, engineering, deployment, backend procedures...\n\
If the question belongs to both, answer 'policy,ops'. If unclear, answer 'ambiguous'.";

const SPLIT_PROMPT: &str = "Split the employee question into one search query per document category. \
Respond with a single JSON object and nothing else: \
{\"policy_query\": \"<part about policies/HR>\", \"ops_query\": \"<part about operations/engineering>\"}. \
Use an empty string for a category the question does not touch.";

/// Routing intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Policy,
    Ops,
    Ambiguous,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Policy => "policy",
            Intent::Ops => "ops",
            Intent::Ambiguous => "ambiguous",
        }
    }

    /// Both or neither category means the question is routed everywhere
    pub fn from_flags(flags: IntentFlags) -> Self {
        match (flags.has_policy, flags.has_ops) {
            (true, false) => Intent::Policy,
            (false, true) => Intent::Ops,
            _ => Intent::Ambiguous,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories named by the classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFlags {
    pub has_policy: bool,
    pub has_ops: bool,
}

impl IntentFlags {
    /// Parse a comma-separated label list, exact token match after trimming
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(',')
            .map(|t| t.trim().trim_matches(|c: char| c == '\'' || c == '"' || c == '.'))
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            has_policy: tokens.iter().any(|t| *t == "policy"),
            has_ops: tokens.iter().any(|t| *t == "ops"),
        }
    }
}

/// Fully derived query; fields are fixed once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    raw: String,
    rewritten: Option<String>,
    intent: Intent,
    sub_queries: Option<BTreeMap<String, String>>,
}

impl Query {
    pub fn new(
        raw: impl Into<String>,
        rewritten: Option<String>,
        intent: Intent,
        sub_queries: Option<BTreeMap<String, String>>,
    ) -> Self {
        Self {
            raw: raw.into(),
            rewritten,
            intent,
            sub_queries,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn rewritten(&self) -> Option<&str> {
        self.rewritten.as_deref()
    }

    /// Rewritten text when present, otherwise the raw text
    pub fn text(&self) -> &str {
        self.rewritten.as_deref().unwrap_or(&self.raw)
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn sub_queries(&self) -> Option<&BTreeMap<String, String>> {
        self.sub_queries.as_ref()
    }

    /// Query text a tool should search with
    pub fn query_for_tool(&self, tool: &str) -> &str {
        self.sub_queries
            .as_ref()
            .and_then(|m| m.get(tool))
            .map(String::as_str)
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| self.text())
    }
}

/// Outcome of the rewrite step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// `None` when the query was kept as-is
    pub text: Option<String>,
    pub provider: Option<String>,
}

/// Outcome of intent classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub flags: IntentFlags,
    /// Provider label that answered, `None` when the default was used
    pub source: Option<String>,
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// First parseable JSON object in free-form model output
pub fn extract_first_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let body = strip_code_fences(text);
    for (start, _) in body.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&body[start..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            return Some(map);
        }
    }
    None
}

/// Parse `{policy_query, ops_query}` into per-tool queries
///
/// Fields that are missing, blank or non-string are left out so those tools fall
/// back to the single query.
pub fn parse_split(raw: &str, plan: &[&str]) -> Option<BTreeMap<String, String>> {
    let object = extract_first_json_object(raw)?;

    let mut split = BTreeMap::new();
    for tool in plan {
        let field = match *tool {
            POLICY_TOOL => "policy_query",
            OPS_TOOL => "ops_query",
            _ => continue,
        };
        if let Some(Value::String(q)) = object.get(field) {
            let q = q.trim();
            if !q.is_empty() {
                split.insert(tool.to_string(), q.to_string());
            }
        }
    }

    (!split.is_empty()).then_some(split)
}

/// Rewrites, classifies and splits queries through the provider gateway
pub struct QueryPreprocessor {
    gateway: Option<Arc<ProviderGateway>>,
    rewrite_min_words: usize,
}

impl QueryPreprocessor {
    pub fn new(gateway: Option<Arc<ProviderGateway>>, rewrite_min_words: usize) -> Self {
        Self {
            gateway,
            rewrite_min_words,
        }
    }

    pub async fn rewrite(&self, text: &str) -> Rewrite {
        let unchanged = Rewrite {
            text: None,
            provider: None,
        };

        let Some(gateway) = &self.gateway else {
            return unchanged;
        };

        if text.split_whitespace().count() <= self.rewrite_min_words {
            tracing::debug!("Query too short to rewrite");
            return unchanged;
        }

        let messages = vec![
            ChatMessage::system(REWRITE_PROMPT),
            ChatMessage::user(format!("Original question: {}", text)),
        ];

        match gateway.chat(&messages, "query-rewrite").await {
            Some(completion) => {
                tracing::debug!("Rewrote query as: {}", completion.content);
                Rewrite {
                    text: Some(completion.content),
                    provider: Some(completion.label),
                }
            }
            None => {
                tracing::warn!("Query rewrite unavailable, using original text");
                unchanged
            }
        }
    }

    pub async fn classify(&self, text: &str) -> Classification {
        let default = Classification {
            intent: Intent::Ambiguous,
            flags: IntentFlags::default(),
            source: None,
        };

        let Some(gateway) = &self.gateway else {
            return default;
        };

        let messages = vec![
            ChatMessage::system(INTENT_PROMPT),
            ChatMessage::user(format!("Question: {}", text)),
        ];

        match gateway.chat(&messages, "intent-detection").await {
            Some(completion) => {
                let flags = IntentFlags::parse(&completion.content);
                let intent = Intent::from_flags(flags);
                tracing::info!("Intent: {} (raw: {:?})", intent, completion.content);
                Classification {
                    intent,
                    flags,
                    source: Some(completion.label),
                }
            }
            None => {
                tracing::warn!("Intent classification unavailable, routing to all tools");
                default
            }
        }
    }

    /// Per-tool sub-queries; only attempted for multi-tool plans
    pub async fn split(&self, text: &str, plan: &[&str]) -> Option<BTreeMap<String, String>> {
        if plan.len() <= 1 {
            return None;
        }
        let gateway = self.gateway.as_ref()?;

        let messages = vec![
            ChatMessage::system(SPLIT_PROMPT),
            ChatMessage::user(format!("Question: {}", text)),
        ];

        let completion = gateway.chat(&messages, "query-split").await?;
        let split = parse_split(&completion.content, plan);
        if split.is_none() {
            tracing::warn!("Could not parse query split: {:?}", completion.content);
        }
        split
    }
}
