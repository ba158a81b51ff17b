//! Text embedding
//!
//! Every embedder returns L2-normalized vectors so cosine distance is stable
//! across backends.

use crate::config::{EmbedderKind, StoreConfig};
use crate::error::{DocentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DocentError::Llm("No embedding returned".to_string()))
    }

    /// Generate embeddings for batch of texts, same order as input
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Scale a vector to unit length in place; zero vectors are left alone
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Deterministic local embedder based on feature hashing
///
/// Each lowercased word and each character trigram of a word is hashed with
/// blake3 into one signed bucket. Works offline and gives identical vectors
/// for identical text, which keeps retrieval reproducible in tests.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let index = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]) % self.dimensions as u64;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index as usize] += sign * weight;
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vector, word, 1.0);

            let chars: Vec<char> = format!("#{}#", word).chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &trigram, 0.5);
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "blake3-feature-hash"
    }
}

/// Embedder that calls an OpenAI-compatible `/v1/embeddings` endpoint
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(DocentError::Http)?;

        Ok(Self {
            http_client,
            url: url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbedResponse {
            data: Vec<EmbedData>,
        }

        #[derive(Deserialize)]
        struct EmbedData {
            #[serde(default)]
            index: Option<usize>,
            embedding: Vec<f32>,
        }

        let url = format!("{}/v1/embeddings", self.url);
        let mut req = self.http_client.post(&url).json(&EmbedRequest {
            model: &self.model,
            input: texts,
        });

        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DocentError::ExternalError(format!(
                "Embedding service error (HTTP {}): {}",
                status, body
            )));
        }

        let mut parsed: EmbedResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(DocentError::ExternalError(format!(
                "Embedding service returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(parsed
            .data
            .into_iter()
            .map(|d| {
                let mut v = d.embedding;
                l2_normalize(&mut v);
                v
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the embedder selected by the store configuration
pub fn embedder_from_config(config: &StoreConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedder {
        EmbedderKind::Hash => Ok(Arc::new(HashEmbedder::new(config.embedding_dimensions))),
        EmbedderKind::Http => {
            let url = config.embedding_url.clone().ok_or_else(|| {
                DocentError::Config("store.embedding_url is required for the http embedder".into())
            })?;
            Ok(Arc::new(HttpEmbedder::new(
                url,
                config.embedding_api_key.clone(),
                &config.embedding_model,
                config.embedding_dimensions,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("Work from home policy").await.unwrap();
        let b = embedder.embed("work from HOME policy").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("  ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = HashEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed_text("alpha"));
        assert_eq!(batch[1], embedder.embed_text("beta"));
    }

    #[test]
    fn test_http_embedder_requires_url() {
        let mut config = StoreConfig::default();
        config.embedder = EmbedderKind::Http;
        config.embedding_url = None;
        assert!(embedder_from_config(&config).is_err());
    }
}
