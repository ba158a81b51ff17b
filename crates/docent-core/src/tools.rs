//! Retrieval tools
//!
//! Each tool is a named view over the vector store restricted to one document
//! category. Tools share nothing but the store handle.

use crate::error::{DocentError, Result};
use crate::store::{Metadata, MetadataFilter, VectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One planned tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub tool: String,
    pub query: String,
    pub top_k: usize,
    pub include_content: bool,
}

/// A single retrieved chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolHit {
    #[serde(default)]
    pub content: Option<String>,
    pub metadata: Metadata,
}

/// Tool response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub results: Vec<ToolHit>,
    pub document_type: String,
    pub count: usize,
}

#[async_trait]
pub trait RetrievalTool: Send + Sync {
    /// Stable tool identifier, e.g. `policy_tool`
    fn name(&self) -> &str;

    /// Document category this tool searches
    fn category(&self) -> &str;

    async fn execute(&self, query: &str, top_k: usize, include_content: bool)
        -> Result<ToolOutput>;
}

/// Tool that searches one `document_type` in the vector store
pub struct CategoryLookupTool {
    name: String,
    category: String,
    store: Arc<dyn VectorStore>,
}

impl CategoryLookupTool {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            store,
        }
    }
}

#[async_trait]
impl RetrievalTool for CategoryLookupTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> &str {
        &self.category
    }

    async fn execute(
        &self,
        query: &str,
        top_k: usize,
        include_content: bool,
    ) -> Result<ToolOutput> {
        if query.trim().is_empty() {
            return Err(DocentError::Tool(format!("{}: empty query", self.name)));
        }

        let filter = MetadataFilter::new().eq("document_type", self.category.as_str());
        let hits = self
            .store
            .query(query, top_k, Some(&filter))
            .await
            .map_err(|e| DocentError::Tool(format!("{}: {}", self.name, e)))?;

        let results: Vec<ToolHit> = hits
            .into_iter()
            .map(|hit| ToolHit {
                content: include_content.then_some(hit.content),
                metadata: hit.metadata,
            })
            .collect();

        tracing::debug!("{} returned {} results", self.name, results.len());

        Ok(ToolOutput {
            count: results.len(),
            results,
            document_type: self.category.clone(),
        })
    }
}

/// Registered tools by name
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn RetrievalTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn RetrievalTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with(mut self, tool: Arc<dyn RetrievalTool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RetrievalTool>> {
        self.tools.get(name).cloned()
    }

    /// Category of a registered tool
    pub fn category_of(&self, name: &str) -> Option<String> {
        self.tools.get(name).map(|t| t.category().to_string())
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// The two standard lookup tools over a shared store
    pub fn standard(store: Arc<dyn VectorStore>) -> Self {
        use crate::planner::{OPS_TOOL, POLICY_TOOL};
        Self::new()
            .with(Arc::new(CategoryLookupTool::new(
                POLICY_TOOL,
                "policy",
                store.clone(),
            )))
            .with(Arc::new(CategoryLookupTool::new(OPS_TOOL, "ops", store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::store::{SqliteVectorStore, StoredItem};
    use serde_json::json;

    async fn seeded_store() -> Arc<dyn VectorStore> {
        let store =
            SqliteVectorStore::open_in_memory("tools", Arc::new(HashEmbedder::new(64))).unwrap();
        let items = vec![
            ("Remote work policy allows two days", "policy", "wfh.md"),
            ("Deploy rollback runbook", "ops", "rollback.md"),
        ];
        store
            .upsert(
                items
                    .into_iter()
                    .map(|(content, ty, file)| {
                        let mut m = Metadata::new();
                        m.insert("document_type".into(), json!(ty));
                        m.insert("filename".into(), json!(file));
                        StoredItem::new(content, m)
                    })
                    .collect(),
                32,
            )
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_tool_filters_by_category() {
        let registry = ToolRegistry::standard(seeded_store().await);
        let tool = registry.get("ops_tool").unwrap();
        let out = tool.execute("rollback", 5, true).await.unwrap();
        assert_eq!(out.document_type, "ops");
        assert_eq!(out.count, 1);
        assert_eq!(out.results[0].metadata["filename"], "rollback.md");
        assert!(out.results[0].content.is_some());
    }

    #[tokio::test]
    async fn test_content_flag_omits_text() {
        let registry = ToolRegistry::standard(seeded_store().await);
        let out = registry
            .get("policy_tool")
            .unwrap()
            .execute("remote work", 5, false)
            .await
            .unwrap();
        assert_eq!(out.count, 1);
        assert!(out.results[0].content.is_none());
    }

    #[test]
    fn test_registry_category_lookup() {
        let store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::open_in_memory("t", Arc::new(HashEmbedder::new(8))).unwrap(),
        );
        let registry = ToolRegistry::standard(store);
        assert_eq!(registry.category_of("policy_tool").as_deref(), Some("policy"));
        assert_eq!(registry.names(), vec!["ops_tool", "policy_tool"]);
        assert!(registry.get("hr_tool").is_none());
    }
}
