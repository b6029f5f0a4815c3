//! Embedding provider abstraction and vector utilities.
//!
//! [`EmbeddingProvider`] is the seam between the pipeline and the model API;
//! [`OpenAIProvider`] is the only implementation. The vector helpers below it
//! are shared by the store ([`vec_to_blob`], [`cosine_similarity`]) and by
//! `store embed` ([`l2_normalize`], [`NormSummary`]).

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::OpenAIConfig;
use crate::openai::OpenAIClient;

/// Dimensionality of the well-known OpenAI embedding models; 0 when unknown.
pub fn known_dims(model: &str) -> usize {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        "text-embedding-3-large" => 3072,
        _ => 0,
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// 0 when the model is not a known one.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Embedding provider backed by `POST {base_url}/embeddings`.
pub struct OpenAIProvider {
    client: OpenAIClient,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            dims: known_dims(&model),
            client,
            model,
        }
    }

    /// Build from `[openai]`, optionally overriding the model.
    pub fn from_config(config: &OpenAIConfig, model: Option<&str>) -> Result<Self> {
        let client = OpenAIClient::from_config(config)?;
        Ok(Self::new(
            client,
            model.unwrap_or(&config.embedding_model).to_string(),
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self.client.post("embeddings", &body).await?;
        let vectors = parse_embeddings_response(&json)?;
        if vectors.len() != texts.len() {
            bail!(
                "Embedding count mismatch: sent {} texts, received {} vectors",
                texts.len(),
                vectors.len()
            );
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Euclidean norm.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length.
///
/// Returns `(normalized, norm_before, norm_after)`. A zero vector is
/// returned unchanged with both norms 0.
pub fn l2_normalize(v: &[f32]) -> (Vec<f32>, f32, f32) {
    let before = l2_norm(v);
    if before == 0.0 {
        return (v.to_vec(), 0.0, 0.0);
    }
    let normalized: Vec<f32> = v.iter().map(|x| x / before).collect();
    let after = l2_norm(&normalized);
    (normalized, before, after)
}

/// Running statistics over a batch of normalizations.
#[derive(Debug, Clone, Default)]
pub struct NormSummary {
    count: usize,
    sum_before: f64,
    sum_after: f64,
    min_after: Option<f32>,
    max_after: Option<f32>,
}

impl NormSummary {
    pub fn record(&mut self, before: f32, after: f32) {
        self.count += 1;
        self.sum_before += before as f64;
        self.sum_after += after as f64;
        self.min_after = Some(self.min_after.map_or(after, |m| m.min(after)));
        self.max_after = Some(self.max_after.map_or(after, |m| m.max(after)));
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn avg_before(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_before / self.count as f64
        }
    }

    pub fn avg_after(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_after / self.count as f64
        }
    }

    pub fn min_after(&self) -> f32 {
        self.min_after.unwrap_or(0.0)
    }

    pub fn max_after(&self) -> f32 {
        self.max_after.unwrap_or(0.0)
    }

    pub fn log(&self) {
        tracing::info!("Normalization summary:");
        tracing::info!("  Embeddings normalized: {}", self.count);
        tracing::info!("  Average norm before: {:.6}", self.avg_before());
        tracing::info!("  Average norm after: {:.6}", self.avg_after());
        tracing::info!(
            "  Norm range after: {:.6} to {:.6}",
            self.min_after(),
            self.max_after()
        );
    }
}

/// Pack a vector as little-endian `f32` bytes for a BLOB column.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_blob`]; a trailing partial value is dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .filter_map(|bytes| bytes.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

/// Cosine of the angle between `a` and `b`, in `[-1, 1]`.
///
/// Vectors of different dimension, empty vectors and zero vectors score 0,
/// so a stored record with the wrong dimension simply ranks last.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });
    let norms = aa.sqrt() * bb.sqrt();
    if norms <= f32::EPSILON {
        0.0
    } else {
        dot / norms
    }
}
