//! Pipeline configuration.
//!
//! One frozen value passed into [`crate::AnswerPipeline`] at construction.
//! Tuning thresholds is an external concern; the pipeline only validates
//! ranges and applies the values as given. A configuration change requires
//! constructing a new pipeline, never in-place mutation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Immutable configuration for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Candidates fetched from the vector index per query.
    pub top_k: usize,
    /// Minimum similarity (0.0–1.0) a chunk must score to survive the
    /// threshold filter. Similarity is cosine clamped to [0, 1].
    pub min_similarity: f32,
    /// Whether the rerank stage scores candidates with a finer relevance
    /// signal. When false the stage is the identity truncation to `rerank_n`.
    pub rerank_enabled: bool,
    /// Survivors kept after the rerank stage.
    pub rerank_n: usize,
    /// Maximum evidence context size in characters. Chunks that would
    /// overflow are skipped whole, never truncated mid-text.
    pub evidence_budget: usize,
    /// Fraction (0.0–1.0) of draft sentences allowed to lack a valid
    /// citation before the whole draft is refused. The fraction converts to
    /// a whole-sentence allowance via `ceil(tolerance * total)`.
    pub citation_tolerance: f32,
    /// Minimum entailment score (0.0–1.0) a cited sentence must reach
    /// against its cited evidence to survive the grounding guard.
    pub grounding_confidence: f32,
    /// Per-call timeout for the generator adapter.
    pub generation_timeout_ms: u64,
    /// Extra generation attempts after the first failure.
    pub generation_retries: u32,
    /// Base backoff between generation attempts (multiplied by attempt
    /// number).
    pub generation_backoff_ms: u64,
    /// Minimum body length (characters, before the disclaimer) a partial
    /// answer must keep to be returned at all. 0 disables the policy and a
    /// partial answer of any length is returned.
    pub min_partial_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.75,
            rerank_enabled: false,
            rerank_n: 3,
            evidence_budget: 6_000,
            citation_tolerance: 0.2,
            grounding_confidence: 0.5,
            generation_timeout_ms: 30_000,
            generation_retries: 1,
            generation_backoff_ms: 250,
            min_partial_chars: 0,
        }
    }
}

/// Configuration validation errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be within 0.0..=1.0, got {value}")]
    UnitRange { field: &'static str, value: f32 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl PipelineConfig {
    /// Validate ranges before constructing a pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("min_similarity", self.min_similarity),
            ("citation_tolerance", self.citation_tolerance),
            ("grounding_confidence", self.grounding_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::UnitRange { field, value });
            }
        }
        if self.top_k == 0 {
            return Err(ConfigError::Zero("top_k"));
        }
        if self.rerank_n == 0 {
            return Err(ConfigError::Zero("rerank_n"));
        }
        if self.evidence_budget == 0 {
            return Err(ConfigError::Zero("evidence_budget"));
        }
        Ok(())
    }
}
