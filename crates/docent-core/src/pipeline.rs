//! The retrieval-augmented answering pipeline
//!
//! rewrite → classify → plan → split → concurrent retrieval → prioritize →
//! synthesize. Every stage before synthesis degrades instead of failing, and
//! `run` itself never returns an error: the caller gets either an answer or a
//! structured no-answer with diagnostics.

use crate::config::PipelineConfig;
use crate::evidence::{extract_evidence, prioritize, EvidenceItem, PrioritizeOptions, ToolRun};
use crate::llm::ProviderGateway;
use crate::planner::{category_for_tool, infer_provider_label, plan_tools};
use crate::query::{Intent, Query, QueryPreprocessor};
use crate::synth::{AnswerMode, AnswerSynthesizer, SynthOptions};
use crate::tools::{RetrievalRequest, ToolRegistry};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Error code for runs that found nothing to answer from
pub const NO_ANSWER: &str = "no-answer";

/// Error code for runs cut off by the deadline
pub const DEADLINE_EXCEEDED: &str = "deadline-exceeded";

/// Input to `RagPipeline::run`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub user_query: String,
    pub username: String,
    pub top_k: usize,
    pub rewrite: bool,
}

impl RunRequest {
    pub fn new(user_query: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            username: username.into(),
            top_k: 5,
            rewrite: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_rewrite(mut self, rewrite: bool) -> Self {
        self.rewrite = rewrite;
        self
    }
}

/// Diagnostics attached to every outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,

    #[serde(default)]
    pub tool_calls: Vec<String>,

    #[serde(default)]
    pub tool_runs: Vec<ToolRun>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_mode: Option<AnswerMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_source: Option<String>,

    /// Present only when a rewrite was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_queries: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// Successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub response: String,
    pub evidence: Vec<EvidenceItem>,
    pub provider_used: String,
    pub metadata: RunMetadata,
}

impl RunResult {
    pub fn answer_mode(&self) -> Option<AnswerMode> {
        self.metadata.answer_mode
    }
}

/// Run that produced no answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoAnswer {
    pub error: String,
    pub metadata: RunMetadata,
}

/// What `run` returns: serializes as `{response, evidence, provider_used, metadata}`
/// or `{error, metadata}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutcome {
    Answered(RunResult),
    NoAnswer(NoAnswer),
}

impl RunOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, RunOutcome::Answered(_))
    }

    pub fn response(&self) -> Option<&str> {
        match self {
            RunOutcome::Answered(r) => Some(&r.response),
            RunOutcome::NoAnswer(_) => None,
        }
    }

    pub fn metadata(&self) -> &RunMetadata {
        match self {
            RunOutcome::Answered(r) => &r.metadata,
            RunOutcome::NoAnswer(n) => &n.metadata,
        }
    }
}

/// Pipeline knobs not owned by a component
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub rewrite_min_words: usize,
    pub prioritize: PrioritizeOptions,
    pub synth: SynthOptions,
    pub deadline: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            rewrite_min_words: config.rewrite_min_words,
            prioritize: PrioritizeOptions {
                min_per_bucket: config.min_per_bucket,
                max_total: config.max_total,
            },
            synth: SynthOptions::from(config),
            deadline: config.deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Orchestrates one question end to end
pub struct RagPipeline {
    preprocessor: QueryPreprocessor,
    tools: ToolRegistry,
    synthesizer: AnswerSynthesizer,
    options: PipelineOptions,
}

impl RagPipeline {
    /// `gateway` may be `None`, in which case every model step uses its default
    pub fn new(
        gateway: Option<Arc<ProviderGateway>>,
        tools: ToolRegistry,
        options: PipelineOptions,
    ) -> Self {
        Self {
            preprocessor: QueryPreprocessor::new(gateway.clone(), options.rewrite_min_words),
            synthesizer: AnswerSynthesizer::new(gateway, options.synth),
            tools,
            options,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer a question, bounded by the configured deadline
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        let Some(deadline) = self.options.deadline else {
            return self.run_stages(&request).await;
        };

        match tokio::time::timeout(deadline, self.run_stages(&request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    "Pipeline deadline of {:?} exceeded for {}",
                    deadline,
                    request.username
                );
                RunOutcome::NoAnswer(NoAnswer {
                    error: DEADLINE_EXCEEDED.to_string(),
                    metadata: RunMetadata {
                        requested_by: Some(request.username.clone()),
                        ..Default::default()
                    },
                })
            }
        }
    }

    async fn run_stages(&self, request: &RunRequest) -> RunOutcome {
        let raw = request.user_query.trim();

        // Rewrite
        let rewrite = if request.rewrite {
            Some(self.preprocessor.rewrite(raw).await)
        } else {
            None
        };
        let rewritten = rewrite.as_ref().and_then(|r| r.text.clone());
        let working_text = rewritten.as_deref().unwrap_or(raw);

        // Classify and plan
        let classification = self.preprocessor.classify(working_text).await;
        let plan = plan_tools(classification.intent);
        tracing::info!(
            "Intent {} → plan {:?} (source: {})",
            classification.intent,
            plan,
            classification.source.as_deref().unwrap_or("default")
        );

        // Split
        let sub_queries = self.preprocessor.split(working_text, &plan).await;
        let query = Query::new(raw, rewritten.clone(), classification.intent, sub_queries);

        // Concurrent retrieval
        let requests: Vec<RetrievalRequest> = plan
            .iter()
            .map(|tool| RetrievalRequest {
                tool: tool.to_string(),
                query: query.query_for_tool(tool).to_string(),
                top_k: request.top_k,
                include_content: true,
            })
            .collect();
        let runs = join_all(requests.iter().map(|r| self.execute_tool(r))).await;

        let mut evidence = Vec::new();
        let mut tool_calls = Vec::new();
        let mut tool_runs = Vec::new();
        for (run, items) in runs {
            if run.is_success() {
                tool_calls.push(run.tool.clone());
                evidence.extend(items);
            }
            tool_runs.push(run);
        }

        // Aggregate
        let categories: Vec<String> = tool_calls
            .iter()
            .map(|tool| {
                self.tools
                    .category_of(tool)
                    .or_else(|| category_for_tool(tool).map(str::to_string))
                    .unwrap_or_else(|| tool.clone())
            })
            .collect();
        let category_refs: Vec<&str> = categories.iter().map(String::as_str).collect();
        let prioritized = prioritize(evidence, &category_refs, self.options.prioritize);
        tracing::debug!("{} evidence items after prioritization", prioritized.len());

        let mut metadata = RunMetadata {
            intent: Some(query.intent()),
            tool_calls,
            tool_runs,
            requested_by: Some(request.username.clone()),
            answer_mode: None,
            intent_source: Some(
                classification
                    .source
                    .clone()
                    .unwrap_or_else(|| "default".to_string()),
            ),
            rewritten_query: request.rewrite.then(|| query.text().to_string()),
            rewrite_provider: rewrite.and_then(|r| r.provider),
            summary_provider: None,
            sub_queries: query.sub_queries().cloned(),
            suggestions: Vec::new(),
        };

        // Synthesize
        let intent_label = match query.intent() {
            Intent::Ambiguous => "policy and operations",
            other => other.as_str(),
        };
        match self
            .synthesizer
            .synthesize(query.raw(), &prioritized, intent_label)
            .await
        {
            Some(synthesis) => {
                let provider_used = match (synthesis.mode, &synthesis.provider) {
                    (AnswerMode::LlmSummary, Some(label)) => label.clone(),
                    _ => infer_provider_label(&metadata.tool_calls).to_string(),
                };
                tracing::info!("Answered via {} ({})", provider_used, synthesis.mode);
                metadata.answer_mode = Some(synthesis.mode);
                metadata.summary_provider = synthesis.provider;
                RunOutcome::Answered(RunResult {
                    response: synthesis.text,
                    evidence: prioritized,
                    provider_used,
                    metadata,
                })
            }
            None => {
                tracing::info!("No evidence for query, returning no-answer");
                metadata.suggestions = self.synthesizer.suggest_followups(query.raw()).await;
                RunOutcome::NoAnswer(NoAnswer {
                    error: NO_ANSWER.to_string(),
                    metadata,
                })
            }
        }
    }

    async fn execute_tool(&self, request: &RetrievalRequest) -> (ToolRun, Vec<EvidenceItem>) {
        let tool_name = request.tool.as_str();
        let query = request.query.as_str();
        let Some(tool) = self.tools.get(tool_name) else {
            tracing::error!("Tool '{}' is not registered", tool_name);
            return (
                ToolRun::failed(tool_name, query, format!("Tool '{}' not registered", tool_name)),
                Vec::new(),
            );
        };

        match tool
            .execute(query, request.top_k, request.include_content)
            .await
        {
            Ok(output) => {
                let items = extract_evidence(tool_name, &output);
                (ToolRun::succeeded(tool_name, query, items.len()), items)
            }
            Err(e) => {
                tracing::error!("Tool '{}' failed: {}", tool_name, e);
                (ToolRun::failed(tool_name, query, e.to_string()), Vec::new())
            }
        }
    }
}
