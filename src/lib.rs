//! Evidra: evidence-grounded medical question answering.
//!
//! The crate turns a raw user query into either a cited, grounded answer or
//! an explicit refusal. Every accept/reject decision along the way is
//! captured in an append-only audit record.
//!
//! Stage order: red-flag check → scope classification → retrieval →
//! threshold filter → (optional rerank) → context assembly → generation →
//! validation gates → audit. [`pipeline::orchestrator::AnswerPipeline`] is
//! the sole public entry point for transports.

pub mod config;
pub mod embedding;
pub mod eval;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::orchestrator::{AnswerPipeline, CancelToken};
pub use pipeline::types::{AnswerStatus, Query, RefusalReason, ValidatedAnswer};
