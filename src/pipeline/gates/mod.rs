//! Validation gate chain.
//!
//! A strictly ordered sequence of independent guards between the raw draft
//! and the user: citation guard, grounding guard, response validator. Each
//! gate may pass, downgrade (narrow the answer), or refuse. None may add
//! content. Every outcome is recorded in the audit trail regardless of the
//! final status.

pub mod citation;
pub mod grounding;
pub mod response;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a gate decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Pass,
    Downgrade,
    Refuse,
}

/// One recorded gate (or stage) decision, in evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    pub gate: String,
    pub decision: GateDecision,
    pub detail: String,
}

impl GateOutcome {
    pub fn new(gate: &str, decision: GateDecision, detail: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            decision,
            detail: detail.into(),
        }
    }
}

/// A draft sentence that survived the citation guard, with the expected
/// chunk ids it cites.
#[derive(Debug, Clone, PartialEq)]
pub struct CitedSentence {
    pub text: String,
    pub chunk_ids: Vec<String>,
}

/// Inline citation marker: `[Source: c1]` or `[Source: c1, c2]`.
pub(crate) static MARKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Source:\s*([A-Za-z0-9_\-]+(?:\s*,\s*[A-Za-z0-9_\-]+)*)\s*\]").unwrap()
});
