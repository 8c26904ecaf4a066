//! Embedding providers.
//!
//! The retriever embeds query text through the [`Embedder`] capability,
//! selected by configuration at construction time. The provider policy is:
//! prefer the configured (usually remote) provider, fall back to a local
//! embedder when it is unavailable. The fallback is transparent to the rest
//! of the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Embedding failures.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding provider unreachable: {0}")]
    Unavailable(String),

    #[error("embedding provider error: {0}")]
    Provider(String),
}

/// Text-to-vector capability.
pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimension(&self) -> usize;
}

/// Deterministic local embedder: feature-hashed bag of words, L2-normalized.
///
/// Not a semantic model; it exists so the pipeline stays answerable (with
/// honest, usually lower, similarity scores) when the configured provider is
/// down, and as a deterministic embedder for tests.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

/// FNV-1a. Stable across platforms and releases, unlike `DefaultHasher`.
fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
        {
            let bucket = (fnv1a(token) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Request body for an OpenAI-compatible embeddings endpoint.
#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// Response body from an OpenAI-compatible embeddings endpoint.
#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
}

/// Remote embedding provider over an OpenAI-compatible HTTP endpoint.
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::blocking::Client,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, dimension: usize, timeout_ms: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
            client,
        }
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: vec![text],
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                EmbeddingError::Unavailable(e.to_string())
            } else {
                EmbeddingError::Provider(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Provider(format!(
                "embeddings endpoint returned HTTP {status}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| EmbeddingError::Provider(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| EmbeddingError::Provider("empty embeddings response".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Primary provider with local fallback.
///
/// Tries `primary` first; on any failure logs the error and embeds with
/// `fallback` instead. Both providers must produce vectors of the same
/// dimension for index compatibility.
pub struct FallbackEmbedder<P: Embedder, F: Embedder> {
    primary: P,
    fallback: F,
}

impl<P: Embedder, F: Embedder> FallbackEmbedder<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        if primary.dimension() != fallback.dimension() {
            tracing::warn!(
                primary = primary.dimension(),
                fallback = fallback.dimension(),
                "embedder dimensions differ, fallback vectors will not match the index"
            );
        }
        Self { primary, fallback }
    }
}

impl<P: Embedder, F: Embedder> Embedder for FallbackEmbedder<P, F> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self.primary.embed(text) {
            Ok(vector) => Ok(vector),
            Err(e) => {
                tracing::warn!(error = %e, "primary embedder failed, using local fallback");
                self.fallback.embed(text)
            }
        }
    }

    fn dimension(&self) -> usize {
        self.primary.dimension()
    }
}
