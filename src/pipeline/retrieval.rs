//! Retrieval: embed the query, fetch nearest neighbors, normalize scores.
//!
//! Similarity convention (used consistently across the crate and its tests):
//! the index reports cosine distance `d = 1 - cos`; the retriever converts
//! it to `similarity = clamp(1 - d, 0, 1)`, i.e. cosine similarity clamped
//! to [0, 1]. Negative cosine collapses to 0.

use std::collections::HashSet;

use thiserror::Error;

use super::types::{CandidateSet, EvidenceChunk, Query, ScoredChunk};
use super::PipelineError;
use crate::embedding::Embedder;

/// Vector index failures.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("vector index unreachable: {0}")]
    Unavailable(String),

    #[error("vector index query failed: {0}")]
    Query(String),
}

/// Nearest-neighbor lookup over corpus embeddings. Consumed, never built,
/// by this pipeline.
pub trait VectorIndex {
    /// Returns up to `k` neighbors as (chunk, cosine distance), nearest
    /// first.
    fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<(EvidenceChunk, f32)>, IndexError>;
}

/// Convert the index's cosine distance into the pipeline's similarity.
pub fn similarity_from_distance(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Embed the query and fetch the top-k candidate set.
///
/// An unreachable index is retried once here; a second failure propagates
/// as [`IndexError::Unavailable`], which the orchestrator reports as a
/// `retrieval_unavailable` refusal. Duplicate chunk ids are dropped,
/// preserving nearest-first order.
pub fn retrieve(
    query: &Query,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    top_k: usize,
) -> Result<CandidateSet, PipelineError> {
    let embedding = embedder.embed(&query.normalized_text)?;

    let neighbors = match index.nearest(&embedding, top_k) {
        Ok(neighbors) => neighbors,
        Err(IndexError::Unavailable(reason)) => {
            tracing::warn!(%reason, "vector index unreachable, retrying once");
            index.nearest(&embedding, top_k)?
        }
        Err(e) => return Err(e.into()),
    };

    let mut seen: HashSet<String> = HashSet::new();
    let candidates: CandidateSet = neighbors
        .into_iter()
        .filter(|(chunk, _)| seen.insert(chunk.chunk_id.clone()))
        .map(|(chunk, distance)| ScoredChunk {
            similarity: similarity_from_distance(distance),
            chunk,
        })
        .collect();

    tracing::info!(
        retrieved = candidates.len(),
        chunk_ids = ?candidates.iter().map(|c| c.chunk.chunk_id.as_str()).collect::<Vec<_>>(),
        scores = ?candidates.iter().map(|c| (c.similarity * 1e6).round() / 1e6).collect::<Vec<_>>(),
        "retrieval complete"
    );

    Ok(candidates)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
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

/// In-memory vector index over raw embeddings. Used in tests and small
/// deployments where the corpus fits in memory.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: Vec<(EvidenceChunk, Vec<f32>)>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, chunk: EvidenceChunk, embedding: Vec<f32>) {
        self.entries.push((chunk, embedding));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<(EvidenceChunk, f32)>, IndexError> {
        let mut scored: Vec<(f32, &EvidenceChunk)> = self
            .entries
            .iter()
            .map(|(chunk, stored)| (1.0 - cosine_similarity(embedding, stored), chunk))
            .collect();

        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, chunk)| (chunk.clone(), distance))
            .collect())
    }
}
