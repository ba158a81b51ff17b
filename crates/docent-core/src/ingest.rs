//! Document ingestion: chunking and indexing into the vector store

use crate::error::{DocentError, Result};
use crate::store::{Metadata, MetadataFilter, StoredItem, VectorStore};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

pub const CHUNK_SIZE_CHARS: usize = 1000;
pub const CHUNK_OVERLAP_CHARS: usize = 200;

/// Window at the end of a chunk searched for a sentence end
const SENTENCE_WINDOW: usize = 100;

lazy_static! {
    static ref HEADING: Regex = Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+(.+?)[ \t]*#*[ \t]*$").unwrap();
}

/// Document chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Char offset of the chunk start in the source text
    pub position: usize,
}

/// Split text into overlapping chunks measured in characters
///
/// A chunk that would end mid-text is cut after the last `. ! ? \n` within its
/// final 100 characters. Chunks are trimmed and empty ones dropped.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());

        if end < chars.len() {
            let window_start = end.saturating_sub(SENTENCE_WINDOW).max(start);
            if let Some(cut) = (window_start..end)
                .rev()
                .find(|&i| matches!(chars[i], '.' | '!' | '?' | '\n'))
            {
                end = cut + 1;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            let leading = piece.chars().take_while(|c| c.is_whitespace()).count();
            chunks.push(Chunk {
                text: trimmed.to_string(),
                position: start + leading,
            });
        }

        if end >= chars.len() {
            break;
        }
        // Always move forward, even when overlap >= chunk length
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Markdown headings with their char offsets
fn headings(text: &str) -> Vec<(usize, String)> {
    HEADING
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let title = c.get(1)?.as_str().trim().to_string();
            let offset = text[..whole.start()].chars().count();
            Some((offset, title))
        })
        .collect()
}

/// Section of a chunk: its first heading, else the heading in effect where it starts
fn section_for(chunk: &Chunk, headings: &[(usize, String)]) -> Option<String> {
    let end = chunk.position + chunk.text.chars().count();
    headings
        .iter()
        .find(|(offset, _)| *offset >= chunk.position && *offset < end)
        .or_else(|| {
            headings
                .iter()
                .rev()
                .find(|(offset, _)| *offset < chunk.position)
        })
        .map(|(_, title)| title.clone())
}

/// A text document to index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInput {
    pub document_id: String,
    pub filename: String,
    pub document_type: String,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    pub text: String,
}

impl DocumentInput {
    /// Read a text or markdown file; the id is derived from its name and category
    pub fn from_file(
        path: &Path,
        document_type: impl Into<String>,
        uploaded_by: Option<String>,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let document_type = document_type.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| DocentError::InvalidInput(format!("not a file: {}", path.display())))?;

        Ok(Self {
            document_id: document_id_for(&filename, &document_type),
            filename,
            document_type,
            uploaded_by,
            text,
        })
    }
}

/// Stable document id: short blake3 digest of filename and category
///
/// Content is left out so an edited file keeps its id and re-indexing
/// replaces the previous version.
pub fn document_id_for(filename: &str, document_type: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(filename.as_bytes());
    hasher.update(&[0]);
    hasher.update(document_type.as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

/// Result of indexing one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_id: String,
    pub filename: String,
    pub chunks: usize,
    pub replaced: usize,
}

/// Chunks documents and writes them to the vector store
pub struct DocumentIndexer {
    store: Arc<dyn VectorStore>,
    chunk_size: usize,
    overlap: usize,
    batch_size: usize,
}

impl DocumentIndexer {
    pub fn new(store: Arc<dyn VectorStore>, batch_size: usize) -> Self {
        Self {
            store,
            chunk_size: CHUNK_SIZE_CHARS,
            overlap: CHUNK_OVERLAP_CHARS,
            batch_size,
        }
    }

    pub fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self
    }

    /// Chunk and upsert a document, replacing any chunks it had before
    pub async fn index_document(&self, doc: &DocumentInput) -> Result<IndexReport> {
        if doc.document_type.trim().is_empty() {
            return Err(DocentError::InvalidInput(
                "document_type must not be empty".to_string(),
            ));
        }

        let chunks = chunk_text(&doc.text, self.chunk_size, self.overlap);
        if chunks.is_empty() {
            return Err(DocentError::InvalidInput(format!(
                "{} has no text to index",
                doc.filename
            )));
        }

        let replaced = self.remove_document(&doc.document_id).await;
        let headings = headings(&doc.text);
        let total = chunks.len();

        let items: Vec<StoredItem> = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut metadata = Metadata::new();
                metadata.insert(
                    "id".into(),
                    Value::String(format!("{}-{}", doc.document_id, index)),
                );
                metadata.insert("document_id".into(), Value::String(doc.document_id.clone()));
                metadata.insert("filename".into(), Value::String(doc.filename.clone()));
                metadata.insert(
                    "document_type".into(),
                    Value::String(doc.document_type.clone()),
                );
                if let Some(section) = section_for(chunk, &headings) {
                    metadata.insert("section".into(), Value::String(section));
                }
                if let Some(user) = &doc.uploaded_by {
                    metadata.insert("uploaded_by".into(), Value::String(user.clone()));
                }
                metadata.insert("chunk_index".into(), Value::from(index));
                metadata.insert("total_chunks".into(), Value::from(total));
                StoredItem::new(chunk.text.clone(), metadata)
            })
            .collect();

        self.store.upsert(items, self.batch_size).await?;
        tracing::info!(
            "Indexed {} ({} chunks, {} replaced)",
            doc.filename,
            total,
            replaced
        );

        Ok(IndexReport {
            document_id: doc.document_id.clone(),
            filename: doc.filename.clone(),
            chunks: total,
            replaced,
        })
    }

    /// Delete every chunk of a document, returning how many were removed
    pub async fn remove_document(&self, document_id: &str) -> usize {
        self.store
            .delete_by_filter(&MetadataFilter::new().eq("document_id", document_id))
            .await
    }
}
