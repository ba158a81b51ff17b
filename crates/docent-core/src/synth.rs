//! Answer synthesis
//!
//! Three tiers: a model-written summary over a bounded excerpt, a deterministic
//! answer built from the top snippets, and no answer at all. Text is never
//! invented when there is no evidence.

use crate::evidence::{citation_block, EvidenceItem};
use crate::llm::{ChatMessage, ProviderGateway};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

const SUMMARY_PROMPT: &str = r#"[ROLE]
You are an internal assistant answering employee questions. Answer accurately and objectively, using ONLY the provided snippets.

[SNIPPETS]
1. Use only the information in the snippets that directly answers the question. Ignore everything else in them.
2. If none of the snippets is relevant, reply exactly: "Sorry, I could not find information about <topic of the question> in the provided documents."
3. If the question has several parts, answer each part separately. For a part the snippets do not cover, say: "About <missing part>, I could not find information in the documents."

[INFERENCE]
1. Never speculate about approvals, amounts, entitlements or business rules that the snippets do not state.
2. Simple common-sense inference from the snippets is allowed. Example: if work days are Monday to Friday, Saturday is a day off.
3. When you infer something, briefly show what it is based on.

[ANSWER]
Cover every part of the question. Match length to the question. Write naturally instead of copying snippets. Name the source document when one is given; never invent a source."#;

const FOLLOWUP_PROMPT: &str = "You are helping an employee whose question matched no documents. \
Suggest at most 2 related questions they could ask, or what extra detail they should provide. \
Return one suggestion per line.";

/// How the answer text was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerMode {
    /// Written by a model over retrieved excerpts
    LlmSummary,
    /// Deterministic snippets, no model configured
    Snippet,
    /// Deterministic snippets after the model path produced nothing
    SnippetFallback,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::LlmSummary => "llm-summary",
            AnswerMode::Snippet => "snippet",
            AnswerMode::SnippetFallback => "snippet-fallback",
        }
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size limits for synthesis
#[derive(Debug, Clone, Copy)]
pub struct SynthOptions {
    pub citation_limit: usize,
    pub excerpt_per_category: usize,
    pub excerpt_total: usize,
    pub snippet_chars: usize,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            citation_limit: 3,
            excerpt_per_category: 2,
            excerpt_total: 4,
            snippet_chars: 500,
        }
    }
}

impl From<&crate::config::PipelineConfig> for SynthOptions {
    fn from(config: &crate::config::PipelineConfig) -> Self {
        Self {
            citation_limit: config.citation_limit,
            excerpt_per_category: config.excerpt_per_category,
            excerpt_total: config.excerpt_total,
            snippet_chars: config.snippet_chars,
        }
    }
}

/// Answer text plus how it was made
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub text: String,
    pub mode: AnswerMode,
    /// Label of the provider that wrote the summary
    pub provider: Option<String>,
}

fn category_key(item: &EvidenceItem) -> &str {
    item.bucket_key()
}

/// Pick excerpt items: one per category first, then fill in order under both caps
///
/// Items without content are skipped. The result keeps the input order.
pub fn select_excerpts(
    items: &[EvidenceItem],
    per_category: usize,
    total: usize,
) -> Vec<&EvidenceItem> {
    let candidates: Vec<(usize, &EvidenceItem)> = items
        .iter()
        .enumerate()
        .filter(|(_, i)| !i.content.trim().is_empty())
        .collect();

    let mut chosen: Vec<usize> = Vec::new();
    let mut per_cat: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    if per_category == 0 || total == 0 {
        return Vec::new();
    }

    // Representation pass
    for (idx, item) in &candidates {
        if chosen.len() >= total {
            break;
        }
        let key = category_key(item);
        if !per_cat.contains_key(key) {
            per_cat.insert(key, 1);
            chosen.push(*idx);
        }
    }

    // Fill pass
    for (idx, item) in &candidates {
        if chosen.len() >= total {
            break;
        }
        if chosen.contains(idx) {
            continue;
        }
        let count = per_cat.entry(category_key(item)).or_insert(0);
        if *count < per_category {
            *count += 1;
            chosen.push(*idx);
        }
    }

    chosen.sort_unstable();
    chosen.into_iter().map(|i| &items[i]).collect()
}

/// Truncate on a char boundary, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

fn category_phrase(categories: &HashSet<&str>) -> &'static str {
    let policy = categories.contains("policy");
    let ops = categories.contains("ops");
    match (policy, ops, categories.len()) {
        (true, false, 1) => "policy",
        (false, true, 1) => "operations",
        (true, true, 2) => "policy and operations",
        _ => "internal",
    }
}

/// Clean up one suggestion line from model output
fn clean_suggestion(line: &str) -> Option<String> {
    let trimmed = line
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '-' | '*' | '•' | '.' | ')'))
        .trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Builds answers from prioritized evidence
pub struct AnswerSynthesizer {
    gateway: Option<Arc<ProviderGateway>>,
    options: SynthOptions,
}

impl AnswerSynthesizer {
    pub fn new(gateway: Option<Arc<ProviderGateway>>, options: SynthOptions) -> Self {
        Self { gateway, options }
    }

    pub fn options(&self) -> &SynthOptions {
        &self.options
    }

    /// Best available answer, `None` when there is nothing to answer from
    pub async fn synthesize(
        &self,
        query: &str,
        items: &[EvidenceItem],
        intent_label: &str,
    ) -> Option<Synthesis> {
        if items.is_empty() {
            return None;
        }

        if let Some(gateway) = &self.gateway {
            if let Some((text, provider)) = self.summarize(gateway, query, items, intent_label).await
            {
                return Some(Synthesis {
                    text,
                    mode: AnswerMode::LlmSummary,
                    provider: Some(provider),
                });
            }
            tracing::warn!("Summary unavailable, answering from snippets");
        }

        let mode = if self.gateway.is_some() {
            AnswerMode::SnippetFallback
        } else {
            AnswerMode::Snippet
        };

        self.deterministic_answer(query, items).map(|text| Synthesis {
            text,
            mode,
            provider: None,
        })
    }

    /// Model-written summary with citations appended
    pub async fn summarize(
        &self,
        gateway: &ProviderGateway,
        query: &str,
        items: &[EvidenceItem],
        intent_label: &str,
    ) -> Option<(String, String)> {
        let excerpts = select_excerpts(
            items,
            self.options.excerpt_per_category,
            self.options.excerpt_total,
        );
        if excerpts.is_empty() {
            return None;
        }

        let evidence_text = excerpts
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "{}:\n{}",
                    item.header(&format!("Document {}", i + 1)),
                    item.content.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let user_prompt = format!(
            "Question: {}\n\nQuestion type: {}\n\nRetrieved documents:\n{}\n\n\
             Write a complete answer that keeps the important details (figures, conditions, steps). \
             No more than 6 sentences.",
            query, intent_label, evidence_text
        );

        let messages = vec![
            ChatMessage::system(SUMMARY_PROMPT),
            ChatMessage::user(user_prompt),
        ];

        let completion = gateway.generate(&messages, "answer-summary").await?;
        let text = format!(
            "{}{}",
            completion.content,
            citation_block(items, self.options.citation_limit)
        );
        Some((text, completion.label))
    }

    /// Top two snippets, preferring one per category, with a framing sentence
    pub fn deterministic_answer(&self, query: &str, items: &[EvidenceItem]) -> Option<String> {
        let picked = select_excerpts(items, usize::MAX, 2);
        if picked.is_empty() {
            return None;
        }

        let categories: HashSet<&str> = picked.iter().filter_map(|i| i.category()).collect();

        let lines: Vec<String> = picked
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let fallback = format!("Document {}", i + 1);
                format!(
                    "- {}: {}",
                    item.filename().unwrap_or(&fallback),
                    truncate_chars(&item.content, self.options.snippet_chars)
                )
            })
            .collect();

        let mut answer = format!(
            "Based on the {} documents, here is what relates to \"{}\":\n{}",
            category_phrase(&categories),
            query,
            lines.join("\n")
        );
        if items.len() > lines.len() {
            answer.push_str("\n- (Other documents also match; ask a follow-up to dig deeper.)");
        }
        Some(answer)
    }

    /// Up to two follow-up suggestions; empty when no model answers
    pub async fn suggest_followups(&self, query: &str) -> Vec<String> {
        let Some(gateway) = &self.gateway else {
            return Vec::new();
        };

        let messages = vec![
            ChatMessage::system(FOLLOWUP_PROMPT),
            ChatMessage::user(format!("I found no documents for the question: {}", query)),
        ];

        match gateway.chat(&messages, "followup-suggestion").await {
            Some(completion) => completion
                .content
                .lines()
                .filter_map(clean_suggestion)
                .take(2)
                .collect(),
            None => Vec::new(),
        }
    }
}
