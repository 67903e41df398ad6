use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Deserialize;
use thiserror::Error;

use crate::config::{RemoteEmbeddingConfig, REMOTE_DEFAULTS};

/// Identifies the backing implementation that powers an embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    RemoteHttp,
    SeededHash,
}

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub provider: ProviderKind,
    pub embedding_model_id: String,
    /// Zero when the backend decides the dimension (remote endpoints).
    pub dimension: usize,
}

/// Errors that can be produced by embedder operations.
#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("invalid embedder configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("embedding request failed: {message}")]
    Http { message: String },
    #[error("embedding response malformed: {message}")]
    Provider { message: String },
}

/// Core interface for all embedder implementations.
pub trait Embedder: Send + Sync {
    /// One backend invocation per call: a single request embeds the whole
    /// batch, never one call per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    fn info(&self) -> &EmbedderInfo;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors.pop().ok_or_else(|| EmbedderError::Provider {
            message: "backend returned no vector for a single input".into(),
        })
    }

    /// Degradation wrapper: failures are logged and fold into an empty
    /// sequence. Callers must check the returned length against their input
    /// before pairing vectors with texts.
    fn embed_silent(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        match self.embed_batch(texts) {
            Ok(vectors) => vectors,
            Err(err) => {
                log::warn!("embedding call failed, continuing without vectors: {err}");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug)]
pub struct RemoteEmbedder {
    info: EmbedderInfo,
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl RemoteEmbedder {
    pub fn new(config: RemoteEmbeddingConfig) -> Result<Self, EmbedderError> {
        if config.model.trim().is_empty() {
            return Err(EmbedderError::InvalidConfiguration {
                message: "embedding model id must not be empty".into(),
            });
        }
        let base_url = if config.base_url.trim().is_empty() {
            REMOTE_DEFAULTS.base_url.to_string()
        } else {
            config.base_url.trim().trim_end_matches('/').to_string()
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| EmbedderError::InvalidConfiguration {
                message: format!("failed to build HTTP client: {err}"),
            })?;
        let info = EmbedderInfo {
            provider: ProviderKind::RemoteHttp,
            embedding_model_id: config.model,
            dimension: 0,
        };
        Ok(Self { info, base_url, api_key: config.api_key, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Embedder for RemoteEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.info.embedding_model_id,
            "input": texts,
        });
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let response = request.send().map_err(|err| EmbedderError::Http {
            message: format!("POST {url} failed: {err}"),
        })?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(EmbedderError::Http {
                message: format!("{url} returned {status}: {text}"),
            });
        }
        let parsed: EmbeddingsResponse = response.json().map_err(|err| EmbedderError::Provider {
            message: format!("invalid embeddings payload: {err}"),
        })?;
        order_vectors(parsed, texts.len())
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Reassemble response rows into input order; endpoints may return rows out
/// of order.
fn order_vectors(
    response: EmbeddingsResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbedderError> {
    if response.data.len() != expected {
        return Err(EmbedderError::Provider {
            message: format!("expected {expected} embeddings, got {}", response.data.len()),
        });
    }
    let mut out: Vec<Option<Vec<f32>>> = vec![None; expected];
    for row in response.data {
        let slot = out.get_mut(row.index).ok_or_else(|| EmbedderError::Provider {
            message: format!("embedding index {} out of range", row.index),
        })?;
        if slot.replace(row.embedding).is_some() {
            return Err(EmbedderError::Provider {
                message: format!("duplicate embedding index {}", row.index),
            });
        }
    }
    out.into_iter()
        .map(|v| {
            v.ok_or_else(|| EmbedderError::Provider { message: "missing embedding row".into() })
        })
        .collect()
}

/// Dimension of the backend-default embedding.
pub const HASH_EMBEDDING_DIMENSION: usize = 384;

const HASH_MODEL_ID: &str = "seeded-hash-v1";

/// Deterministic seeded-hash embedder, used as the backend-default embedding
/// when no remote model is configured. Token and bigram hashes accumulate
/// into signed buckets; vectors are L2-normalized so cosine and dot-product
/// ranking agree.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    info: EmbedderInfo,
    base_seed: u64,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbedderError> {
        if dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        Ok(Self::with_dimension(dimension))
    }

    fn with_dimension(dimension: usize) -> Self {
        let info = EmbedderInfo {
            provider: ProviderKind::SeededHash,
            embedding_model_id: HASH_MODEL_ID.to_string(),
            dimension,
        };
        let base_seed = compute_seed(ProviderKind::SeededHash, HASH_MODEL_ID, dimension);
        Self { info, base_seed }
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let tokens = hash_tokens(text);
        let mut embedding = vec![0.0f32; self.info.dimension];
        if tokens.is_empty() {
            return embedding;
        }
        for token in &tokens {
            accumulate(&mut embedding, token, 1.0, self.base_seed);
        }
        for window in tokens.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            accumulate(&mut embedding, &bigram, 0.5, self.base_seed);
        }
        l2_normalize(&mut embedding);
        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::with_dimension(HASH_EMBEDDING_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Ok(texts.iter().map(|t| self.generate(t)).collect())
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Build the embedding function for a configuration: a remote embedder when
/// a model id is set, otherwise the deterministic backend-default.
pub fn build_embedder(config: &RemoteEmbeddingConfig) -> Result<Box<dyn Embedder>, EmbedderError> {
    if config.model.trim().is_empty() {
        return Ok(Box::new(HashEmbedder::default()));
    }
    Ok(Box::new(RemoteEmbedder::new(config.clone())?))
}

fn hash_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= 2)
        .map(|token| token.to_string())
        .collect()
}

fn accumulate(embedding: &mut [f32], token: &str, weight: f32, base_seed: u64) {
    let token_hash = fnv1a_with_seed(base_seed, token.as_bytes());
    for salt in 0..embedding.len() {
        let dim_hash = fnv1a_mix(token_hash, salt as u64);
        let sign = if dim_hash & 1 == 0 { weight } else { -weight };
        let dim = ((dim_hash >> 1) as usize) % embedding.len();
        embedding[dim] += sign;
    }
}

fn fnv1a_with_seed(seed: u64, data: &[u8]) -> u64 {
    let mut bytes = Vec::with_capacity(8 + data.len());
    bytes.extend_from_slice(&seed.to_le_bytes());
    bytes.extend_from_slice(data);
    fnv1a(&bytes)
}

fn fnv1a_mix(seed: u64, salt: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..].copy_from_slice(&salt.to_le_bytes());
    fnv1a(&bytes)
}

fn fnv1a(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vec.iter_mut() {
            *value /= norm;
        }
    }
}

fn compute_seed(provider: ProviderKind, model_id: &str, dimension: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    provider.hash(&mut hasher);
    model_id.hash(&mut hasher);
    dimension.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: usize, value: f32) -> EmbeddingRow {
        EmbeddingRow { index, embedding: vec![value] }
    }

    #[test]
    fn order_vectors_restores_input_order() {
        let response = EmbeddingsResponse { data: vec![row(2, 2.0), row(0, 0.0), row(1, 1.0)] };
        let out = order_vectors(response, 3).unwrap();
        assert_eq!(out, vec![vec![0.0], vec![1.0], vec![2.0]]);
    }

    #[test]
    fn order_vectors_rejects_count_mismatch() {
        let response = EmbeddingsResponse { data: vec![row(0, 0.0)] };
        assert!(order_vectors(response, 2).is_err());
    }

    #[test]
    fn order_vectors_rejects_duplicate_and_out_of_range_indices() {
        let dup = EmbeddingsResponse { data: vec![row(0, 0.0), row(0, 1.0)] };
        assert!(order_vectors(dup, 2).is_err());

        let oob = EmbeddingsResponse { data: vec![row(5, 0.0)] };
        assert!(order_vectors(oob, 1).is_err());
    }
}
