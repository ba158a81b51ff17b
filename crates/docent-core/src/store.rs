//! Vector store gateway
//!
//! Chunks live in one SQLite table per database, partitioned by collection.
//! Embeddings are stored as little-endian f32 BLOBs, metadata as JSON text,
//! and cosine distance is computed in Rust.

use crate::embed::Embedder;
use crate::error::{DocentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Chunk metadata as stored
pub type Metadata = serde_json::Map<String, Value>;

/// Distance metric recorded for every collection
pub const DISTANCE_METRIC: &str = "cosine";

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    metric TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    embedding BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
"#;

/// Item handed to `upsert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StoredItem {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// Search hit; `metadata` also carries `id` and `distance`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Conjunction of metadata equality constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub equals: BTreeMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// Native (typed JSON) equality on every key
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v))
    }

    /// Equality after rendering both sides as strings, so `7` matches `"7"`
    pub fn matches_as_strings(&self, metadata: &Metadata) -> bool {
        self.equals.iter().all(|(k, v)| {
            metadata
                .get(k)
                .is_some_and(|m| value_as_string(m) == value_as_string(v))
        })
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Vector store contract consumed by tools and the indexer
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Insert or replace items in fixed-size batches, returning their ids in input order
    async fn upsert(&self, items: Vec<StoredItem>, batch_size: usize) -> Result<Vec<String>>;

    /// Nearest neighbours by cosine distance, ascending, ties broken by id
    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredItem>>;

    /// Delete matching items; failures are logged and reported as zero deletions
    async fn delete_by_filter(&self, filter: &MetadataFilter) -> usize;

    /// Drop every item and recreate the collection empty
    async fn delete_collection(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// SQLite-backed vector store
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorStore {
    /// Open (and create if needed) a store file
    pub fn open(
        path: impl AsRef<Path>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn, collection.into(), embedder)
    }

    /// Open in-memory store (for testing)
    pub fn open_in_memory(
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, collection.into(), embedder)
    }

    fn initialize(
        conn: Connection,
        collection: String,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(CREATE_TABLES)?;
        ensure_collection(&conn, &collection)?;

        Ok(Self {
            conn: Mutex::new(conn),
            collection,
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DocentError::Store("store connection lock poisoned".to_string()))
    }

    fn insert_batch(&self, batch: &[(String, &StoredItem, Vec<f32>)]) -> Result<()> {
        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO items (collection, id, content, metadata, embedding, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (id, item, embedding) in batch {
                stmt.execute(params![
                    self.collection,
                    id,
                    item.content,
                    serde_json::to_string(&item.metadata)?,
                    embedding_to_bytes(embedding),
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_rows(&self) -> Result<Vec<(String, String, Metadata, Vec<f32>)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, metadata, embedding FROM items WHERE collection = ?1",
        )?;
        let rows = stmt
            .query_map(params![self.collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(id, content, metadata, blob)| {
                (id, content, parse_metadata(&metadata), bytes_to_embedding(&blob))
            })
            .collect())
    }

    /// Equality delete evaluated by SQLite on the stored JSON
    fn delete_native(&self, filter: &MetadataFilter) -> Result<usize> {
        let mut sql = String::from("DELETE FROM items WHERE collection = ?");
        let mut values: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Text(self.collection.clone())];

        for (key, value) in &filter.equals {
            let path = format!("$.\"{}\"", key.replace('"', "\\\""));
            match value {
                Value::Null => {
                    sql.push_str(" AND json_type(metadata, ?) = 'null'");
                    values.push(rusqlite::types::Value::Text(path));
                }
                Value::Array(_) | Value::Object(_) => {
                    sql.push_str(" AND json_extract(metadata, ?) = json(?)");
                    values.push(rusqlite::types::Value::Text(path));
                    values.push(rusqlite::types::Value::Text(value.to_string()));
                }
                scalar => {
                    sql.push_str(" AND json_type(metadata, ?) = ? AND json_extract(metadata, ?) = ?");
                    let (ty, sql_value) = scalar_to_sql(scalar);
                    values.push(rusqlite::types::Value::Text(path.clone()));
                    values.push(rusqlite::types::Value::Text(ty.to_string()));
                    values.push(rusqlite::types::Value::Text(path));
                    values.push(sql_value);
                }
            }
        }

        let conn = self.lock()?;
        Ok(conn.execute(&sql, params_from_iter(values))?)
    }

    /// Full scan comparing by native and string equality
    fn delete_by_scan(&self, filter: &MetadataFilter) -> Result<usize> {
        let matched: BTreeSet<String> = self
            .load_rows()?
            .into_iter()
            .filter(|(_, _, metadata, _)| {
                filter.matches(metadata) || filter.matches_as_strings(metadata)
            })
            .map(|(id, _, _, _)| id)
            .collect();

        if matched.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM items WHERE collection = ?1 AND id = ?2")?;
            for id in &matched {
                deleted += stmt.execute(params![self.collection, id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }
}

fn ensure_collection(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO collections (name, metric, created_at) VALUES (?1, ?2, ?3)",
        params![name, DISTANCE_METRIC, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// SQLite `json_type` name and bind value for a scalar
fn scalar_to_sql(value: &Value) -> (&'static str, rusqlite::types::Value) {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Bool(true) => ("true", Sql::Integer(1)),
        Value::Bool(false) => ("false", Sql::Integer(0)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ("integer", Sql::Integer(i)),
            None => ("real", Sql::Real(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => ("text", Sql::Text(s.clone())),
        other => ("text", Sql::Text(other.to_string())),
    }
}

fn parse_metadata(raw: &str) -> Metadata {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Metadata::new(),
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedder.embed_batch(texts).await
    }

    async fn upsert(&self, items: Vec<StoredItem>, batch_size: usize) -> Result<Vec<String>> {
        let batch_size = batch_size.max(1);
        let mut ids = Vec::with_capacity(items.len());

        for (batch_idx, batch) in items.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|i| i.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(DocentError::Store(format!(
                    "embedder returned {} vectors for {} items",
                    embeddings.len(),
                    batch.len()
                )));
            }

            let rows: Vec<(String, &StoredItem, Vec<f32>)> = batch
                .iter()
                .zip(embeddings)
                .map(|(item, embedding)| {
                    let id = match item.metadata.get("id") {
                        Some(Value::String(id)) => id.clone(),
                        _ => uuid::Uuid::new_v4().to_string(),
                    };
                    (id, item, embedding)
                })
                .collect();

            self.insert_batch(&rows)?;
            tracing::debug!(
                "Upserted batch {} ({} items) into {}",
                batch_idx + 1,
                rows.len(),
                self.collection
            );
            ids.extend(rows.into_iter().map(|(id, _, _)| id));
        }

        Ok(ids)
    }

    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredItem>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(text).await?;

        let mut hits: Vec<ScoredItem> = self
            .load_rows()?
            .into_iter()
            .filter(|(_, _, metadata, _)| filter.map_or(true, |f| f.matches(metadata)))
            .map(|(id, content, mut metadata, embedding)| {
                let distance = 1.0 - cosine_similarity(&query_embedding, &embedding);
                metadata.insert("id".to_string(), Value::String(id.clone()));
                metadata.insert("distance".to_string(), Value::from(distance as f64));
                ScoredItem {
                    id,
                    content,
                    metadata,
                    distance,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter) -> usize {
        if filter.is_empty() {
            tracing::warn!("Refusing to delete with an empty filter");
            return 0;
        }

        match self.delete_native(filter) {
            Ok(n) if n > 0 => {
                tracing::info!("Deleted {} items matching {:?}", n, filter.equals);
                return n;
            }
            Ok(_) => tracing::debug!("No native matches for {:?}, scanning", filter.equals),
            Err(e) => tracing::warn!("Native delete failed for {:?}: {}", filter.equals, e),
        }

        match self.delete_by_scan(filter) {
            Ok(n) => {
                if n > 0 {
                    tracing::info!("Deleted {} items matching {:?} by scan", n, filter.equals);
                }
                n
            }
            Err(e) => {
                tracing::warn!("Scan delete failed for {:?}: {}", filter.equals, e);
                0
            }
        }
    }

    async fn delete_collection(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM items WHERE collection = ?1",
            params![self.collection],
        )?;
        tx.execute(
            "DELETE FROM collections WHERE name = ?1",
            params![self.collection],
        )?;
        ensure_collection(&tx, &self.collection)?;
        tx.commit()?;
        tracing::info!("Recreated collection {}", self.collection);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

/// Convert f32 embedding to bytes for storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes to f32 embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use serde_json::json;

    fn store() -> SqliteVectorStore {
        SqliteVectorStore::open_in_memory("test", Arc::new(HashEmbedder::new(64))).unwrap()
    }

    fn meta(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => Metadata::new(),
        }
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_filter_string_equality() {
        let filter = MetadataFilter::new().eq("document_id", "7");
        let m = meta(json!({"document_id": 7}));
        assert!(!filter.matches(&m));
        assert!(filter.matches_as_strings(&m));
    }

    #[tokio::test]
    async fn test_upsert_uses_string_id_or_generates() {
        let store = store();
        let ids = store
            .upsert(
                vec![
                    StoredItem::new("a", meta(json!({"id": "fixed"}))),
                    StoredItem::new("b", meta(json!({"id": 42}))),
                ],
                1,
            )
            .await
            .unwrap();
        assert_eq!(ids[0], "fixed");
        assert_ne!(ids[1], "42");
        assert!(uuid::Uuid::parse_str(&ids[1]).is_ok());

        // Same id replaces rather than duplicates
        store
            .upsert(vec![StoredItem::new("a2", meta(json!({"id": "fixed"})))], 8)
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_query_ranks_and_filters() {
        let store = store();
        store
            .upsert(
                vec![
                    StoredItem::new(
                        "Employees may work from home two days per week",
                        meta(json!({"id": "p1", "document_type": "policy"})),
                    ),
                    StoredItem::new(
                        "Rollback a deployment with the release tool",
                        meta(json!({"id": "o1", "document_type": "ops"})),
                    ),
                ],
                32,
            )
            .await
            .unwrap();

        let hits = store.query("work from home", 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "p1");
        assert!(hits[0].distance <= hits[1].distance);
        assert_eq!(hits[0].metadata["id"], "p1");
        assert!(hits[0].metadata.contains_key("distance"));

        let filter = MetadataFilter::new().eq("document_type", "ops");
        let hits = store.query("work from home", 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "o1");
    }

    #[tokio::test]
    async fn test_delete_by_filter_native_then_scan() {
        let store = store();
        store
            .upsert(
                vec![
                    StoredItem::new("one", meta(json!({"document_id": 7}))),
                    StoredItem::new("two", meta(json!({"document_id": "7"}))),
                    StoredItem::new("three", meta(json!({"document_id": 8}))),
                ],
                32,
            )
            .await
            .unwrap();

        // Native match on the integer only
        let n = store
            .delete_by_filter(&MetadataFilter::new().eq("document_id", 7))
            .await;
        assert_eq!(n, 1);
        // The string "7" is left for a later call
        assert_eq!(store.count().await.unwrap(), 2);

        // String form of 8 has no native match, the scan finds it
        let n = store
            .delete_by_filter(&MetadataFilter::new().eq("document_id", "8"))
            .await;
        assert_eq!(n, 1);
        assert_eq!(store.count().await.unwrap(), 1);

        let n = store
            .delete_by_filter(&MetadataFilter::new().eq("document_id", "missing"))
            .await;
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_delete_collection_recreates_empty() {
        let store = store();
        store
            .upsert(vec![StoredItem::new("x", Metadata::new())], 32)
            .await
            .unwrap();
        store.delete_collection().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        store
            .upsert(vec![StoredItem::new("y", Metadata::new())], 32)
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
