pub mod audit;
pub mod classify;
pub mod context;
pub mod emergency;
pub mod filter;
pub mod gates;
pub mod generator;
pub mod orchestrator;
pub mod rerank;
pub mod retrieval;
pub mod types;

use thiserror::Error;

/// Internal stage failures.
///
/// These never reach the transport layer: the orchestrator converts each
/// variant into a typed refusal (or `internal_error` for anything else) at
/// the pipeline boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingError),

    #[error("vector index error: {0}")]
    Index(#[from] retrieval::IndexError),

    #[error("generation failed: {0}")]
    Generation(#[from] generator::GenerationError),

    #[error("internal pipeline error: {0}")]
    Internal(String),
}
