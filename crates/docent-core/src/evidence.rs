//! Evidence aggregation: tagging, prioritization and citations
//!
//! Ordering depends only on distances and the bucket policy. Items with equal
//! distance are ordered by their stable id so the result does not depend on
//! the order in which tool calls finished.

use crate::store::Metadata;
use crate::tools::ToolOutput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Bucket key for items with neither a category nor an originating tool
pub const OTHER_BUCKET: &str = "other";

/// A retrieved snippet with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub content: String,
    pub metadata: Metadata,
}

impl EvidenceItem {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn filename(&self) -> Option<&str> {
        self.str_field("filename").or_else(|| self.str_field("source"))
    }

    pub fn section(&self) -> Option<&str> {
        self.str_field("section").or_else(|| self.str_field("heading"))
    }

    pub fn category(&self) -> Option<&str> {
        self.str_field("document_type")
    }

    pub fn tool(&self) -> Option<&str> {
        self.str_field("retrieval_tool")
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    /// Lower is better; missing or non-numeric is +inf
    pub fn distance(&self) -> f64 {
        self.metadata
            .get("distance")
            .and_then(Value::as_f64)
            .unwrap_or(f64::INFINITY)
    }

    /// Category, else originating tool, else `other`
    pub fn bucket_key(&self) -> &str {
        self.category().or_else(|| self.tool()).unwrap_or(OTHER_BUCKET)
    }

    /// `filename › section` or just the filename
    pub fn header(&self, fallback: &str) -> String {
        let filename = self.filename().unwrap_or(fallback);
        match self.section() {
            Some(section) => format!("{} › {}", filename, section),
            None => filename.to_string(),
        }
    }
}

/// Outcome of one planned tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRunOutcome {
    ResultCount(usize),
    Error(String),
}

/// Diagnostics for one tool call: exactly one of result count or error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRun {
    pub tool: String,
    pub query: String,
    #[serde(flatten)]
    pub outcome: ToolRunOutcome,
}

impl ToolRun {
    pub fn succeeded(tool: impl Into<String>, query: impl Into<String>, count: usize) -> Self {
        Self {
            tool: tool.into(),
            query: query.into(),
            outcome: ToolRunOutcome::ResultCount(count),
        }
    }

    pub fn failed(tool: impl Into<String>, query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            query: query.into(),
            outcome: ToolRunOutcome::Error(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolRunOutcome::ResultCount(_))
    }
}

/// Turn a tool payload into evidence tagged with its category and tool
pub fn extract_evidence(tool: &str, output: &ToolOutput) -> Vec<EvidenceItem> {
    output
        .results
        .iter()
        .map(|hit| {
            let mut metadata = hit.metadata.clone();
            let has_category = metadata
                .get("document_type")
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty());
            if !has_category && !output.document_type.is_empty() {
                metadata.insert(
                    "document_type".to_string(),
                    Value::String(output.document_type.clone()),
                );
            }
            metadata
                .entry("retrieval_tool")
                .or_insert_with(|| Value::String(tool.to_string()));

            EvidenceItem::new(hit.content.clone().unwrap_or_default(), metadata)
        })
        .collect()
}

fn compare_items(a: &EvidenceItem, b: &EvidenceItem) -> Ordering {
    a.distance()
        .total_cmp(&b.distance())
        .then_with(|| a.id().cmp(&b.id()))
}

/// Sort ascending by distance, missing distances last
pub fn sort_by_distance(items: &mut [EvidenceItem]) {
    items.sort_by(compare_items);
}

/// Bucket policy for multi-tool plans
#[derive(Debug, Clone, Copy)]
pub struct PrioritizeOptions {
    pub min_per_bucket: usize,
    pub max_total: usize,
}

impl Default for PrioritizeOptions {
    fn default() -> Self {
        Self {
            min_per_bucket: 3,
            max_total: 10,
        }
    }
}

/// Order evidence for answering
///
/// `planned_categories` are the categories of the planned tools in plan order.
/// With one planned tool the items are only sorted. With several, items are
/// bucketed by category, every bucket contributes up to `min_per_bucket`
/// items, and the rest is filled round-robin up to `max_total`.
pub fn prioritize(
    items: Vec<EvidenceItem>,
    planned_categories: &[&str],
    options: PrioritizeOptions,
) -> Vec<EvidenceItem> {
    if items.is_empty() {
        return items;
    }

    if planned_categories.len() <= 1 {
        let mut items = items;
        sort_by_distance(&mut items);
        return items;
    }

    let mut encounter: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<EvidenceItem>> = HashMap::new();
    for item in items {
        let key = item.bucket_key().to_string();
        if !buckets.contains_key(&key) {
            encounter.push(key.clone());
        }
        buckets.entry(key).or_default().push(item);
    }

    let mut ordering: Vec<String> = Vec::new();
    for key in planned_categories
        .iter()
        .map(|c| c.to_string())
        .chain(encounter)
    {
        if !ordering.contains(&key) {
            ordering.push(key);
        }
    }

    // Buckets sorted best-first, consumed from the front
    let mut queues: Vec<std::collections::VecDeque<EvidenceItem>> = ordering
        .iter()
        .filter_map(|key| buckets.remove(key))
        .map(|mut bucket| {
            sort_by_distance(&mut bucket);
            bucket.into()
        })
        .collect();

    let mut prioritized = Vec::new();

    for queue in queues.iter_mut() {
        for _ in 0..options.min_per_bucket {
            if prioritized.len() >= options.max_total {
                break;
            }
            match queue.pop_front() {
                Some(item) => prioritized.push(item),
                None => break,
            }
        }
    }

    while prioritized.len() < options.max_total {
        let mut added = false;
        for queue in queues.iter_mut() {
            if prioritized.len() >= options.max_total {
                break;
            }
            if let Some(item) = queue.pop_front() {
                prioritized.push(item);
                added = true;
            }
        }
        if !added {
            break;
        }
    }

    prioritized
}

/// Deduplicated source lines, one per filename
///
/// Scans at most `2 * limit` items and stops after `limit` unique lines.
pub fn build_citations(items: &[EvidenceItem], limit: usize) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut lines = Vec::new();

    for (idx, item) in items.iter().take(limit.saturating_mul(2)).enumerate() {
        if lines.len() >= limit {
            break;
        }
        let fallback = format!("Document {}", idx + 1);
        let filename = item.filename().unwrap_or(&fallback).to_string();
        if seen.contains(&filename) {
            continue;
        }
        lines.push(item.header(&fallback));
        seen.push(filename);
    }

    lines
}

/// Citation block appended to generated answers, empty when there is nothing to cite
pub fn citation_block(items: &[EvidenceItem], limit: usize) -> String {
    let lines = build_citations(items, limit);
    if lines.is_empty() {
        return String::new();
    }
    let body: Vec<String> = lines.iter().map(|l| format!("- {}", l)).collect();
    format!("\n\nSources:\n{}", body.join("\n"))
}
