//! Pipeline orchestrator.
//!
//! Owns the stage sequence for one query: red-flag check, scope
//! classification, retrieval, threshold filter, optional rerank, context
//! assembly, generation, then the validation gate chain. Every invocation
//! terminates in exactly one [`ValidatedAnswer`] and emits exactly one
//! audit record, refusals and internal errors included.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use super::audit::{self, AuditRecord, AuditSink, StageLatency};
use super::classify::classify;
use super::context::build_context;
use super::emergency::{is_emergency_query, EMERGENCY_RESPONSE};
use super::filter::filter_by_similarity;
use super::gates::{citation, grounding, response, GateDecision, GateOutcome};
use super::generator::{build_instructions, build_prompt, generate_with_retry, Generate};
use super::rerank::{rerank, RelevanceScorer};
use super::retrieval::{retrieve, VectorIndex};
use super::types::{AnswerStatus, Query, RefusalReason, ValidatedAnswer};
use super::PipelineError;
use crate::config::{ConfigError, PipelineConfig};
use crate::embedding::Embedder;

/// Cooperative cancellation flag, checked at stage boundaries. A stage
/// already running completes; its result is discarded and the query
/// terminates as a `cancelled` refusal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-invocation audit state, turned into one [`AuditRecord`] at the
/// single exit point.
struct Trail {
    query_id: Uuid,
    threshold_used: f32,
    retrieved_chunk_ids: Vec<String>,
    raw_scores: Vec<f32>,
    accepted_chunk_ids: Vec<String>,
    rejected_chunk_ids: Vec<String>,
    gate_outcomes: Vec<GateOutcome>,
    stage_latencies: Vec<StageLatency>,
}

impl Trail {
    fn new(threshold_used: f32) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            threshold_used,
            retrieved_chunk_ids: vec![],
            raw_scores: vec![],
            accepted_chunk_ids: vec![],
            rejected_chunk_ids: vec![],
            gate_outcomes: vec![],
            stage_latencies: vec![],
        }
    }

    /// Run a stage under a wall-clock timer.
    fn stage<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        self.stage_latencies.push(StageLatency {
            stage: name.to_string(),
            ms: started.elapsed().as_millis() as u64,
        });
        result
    }

    fn outcome(&mut self, outcome: GateOutcome) {
        self.gate_outcomes.push(outcome);
    }

    fn into_record(self, refusal_reason: Option<RefusalReason>) -> AuditRecord {
        AuditRecord {
            query_id: self.query_id,
            timestamp: Utc::now(),
            retrieved_chunk_ids: self.retrieved_chunk_ids,
            raw_scores: self.raw_scores,
            threshold_used: self.threshold_used,
            accepted_chunk_ids: self.accepted_chunk_ids,
            rejected_chunk_ids: self.rejected_chunk_ids,
            gate_outcomes: self.gate_outcomes,
            refusal_reason,
            stage_latencies: self.stage_latencies,
        }
    }
}

/// The answer pipeline. Collaborators are injected at construction and the
/// configuration is frozen for the pipeline's lifetime.
pub struct AnswerPipeline<'a> {
    config: PipelineConfig,
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    generator: &'a dyn Generate,
    scorer: Option<&'a dyn RelevanceScorer>,
    audit: &'a dyn AuditSink,
}

impl<'a> AnswerPipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        generator: &'a dyn Generate,
        audit: &'a dyn AuditSink,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            embedder,
            index,
            generator,
            scorer: None,
            audit,
        })
    }

    /// Attach a relevance scorer. Used by the rerank stage only when
    /// `rerank_enabled` is set.
    pub fn with_scorer(mut self, scorer: &'a dyn RelevanceScorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn answer(&self, query: &Query) -> ValidatedAnswer {
        self.answer_with_cancel(query, &CancelToken::new())
    }

    /// Run the full pipeline. Always returns a terminal answer and always
    /// emits exactly one audit record.
    ///
    /// A panic in any injected collaborator is caught here and terminates
    /// the query as an `internal_error` refusal; the transport never sees
    /// an unwinding fault.
    pub fn answer_with_cancel(&self, query: &Query, cancel: &CancelToken) -> ValidatedAnswer {
        let mut trail = Trail::new(self.config.min_similarity);
        let answer = match catch_unwind(AssertUnwindSafe(|| self.run(query, cancel, &mut trail))) {
            Ok(answer) => answer,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(%detail, "pipeline stage panicked");
                trail.outcome(GateOutcome::new(
                    "internal",
                    GateDecision::Refuse,
                    format!("stage panicked: {detail}"),
                ));
                ValidatedAnswer::refusal(RefusalReason::InternalError)
            }
        };

        tracing::info!(
            query_id = %trail.query_id,
            status = ?answer.status,
            refusal = answer.refusal_reason.map(|r| r.as_str()),
            "query terminated"
        );
        audit::record(self.audit, &trail.into_record(answer.refusal_reason));
        answer
    }

    fn run(&self, query: &Query, cancel: &CancelToken, trail: &mut Trail) -> ValidatedAnswer {
        if let Some(refusal) = cancelled_at(cancel, "before red-flag check", trail) {
            return refusal;
        }

        // Red flags bypass everything, retrieval and generation included.
        if trail.stage("red_flag", || is_emergency_query(&query.normalized_text)) {
            trail.outcome(GateOutcome::new(
                "red_flag",
                GateDecision::Pass,
                "emergency red flag matched, escalation template returned",
            ));
            return ValidatedAnswer {
                text: EMERGENCY_RESPONSE.to_string(),
                citations: vec![],
                status: AnswerStatus::Answered,
                refusal_reason: None,
                emergency: true,
            };
        }

        let classification = trail.stage("scope", || classify(&query.normalized_text));
        if !classification.in_scope {
            trail.outcome(GateOutcome::new(
                "scope",
                GateDecision::Refuse,
                classification.reason,
            ));
            return ValidatedAnswer::refusal(RefusalReason::OutOfScope);
        }
        trail.outcome(GateOutcome::new(
            "scope",
            GateDecision::Pass,
            classification.reason,
        ));

        if let Some(refusal) = cancelled_at(cancel, "before retrieval", trail) {
            return refusal;
        }

        let candidates = match trail.stage("retrieve", || {
            retrieve(query, self.embedder, self.index, self.config.top_k)
        }) {
            Ok(candidates) => candidates,
            Err(e) => {
                let reason = match e {
                    PipelineError::Embedding(_) | PipelineError::Index(_) => {
                        RefusalReason::RetrievalUnavailable
                    }
                    _ => RefusalReason::InternalError,
                };
                tracing::warn!(error = %e, "retrieval stage failed");
                trail.outcome(GateOutcome::new("retrieve", GateDecision::Refuse, e.to_string()));
                return ValidatedAnswer::refusal(reason);
            }
        };
        trail.retrieved_chunk_ids = candidates.iter().map(|c| c.chunk.chunk_id.clone()).collect();
        trail.raw_scores = candidates.iter().map(|c| c.similarity).collect();

        let survivors = trail.stage("threshold_filter", || {
            filter_by_similarity(candidates, self.config.min_similarity)
        });
        trail.accepted_chunk_ids = survivors.iter().map(|c| c.chunk.chunk_id.clone()).collect();
        trail.rejected_chunk_ids = trail
            .retrieved_chunk_ids
            .iter()
            .filter(|id| !trail.accepted_chunk_ids.contains(id))
            .cloned()
            .collect();
        if survivors.is_empty() {
            trail.outcome(GateOutcome::new(
                "threshold_filter",
                GateDecision::Refuse,
                format!(
                    "no candidate at or above similarity {}",
                    self.config.min_similarity
                ),
            ));
            return ValidatedAnswer::refusal(RefusalReason::InsufficientEvidence);
        }

        if let Some(refusal) = cancelled_at(cancel, "before rerank", trail) {
            return refusal;
        }

        let scorer = if self.config.rerank_enabled {
            self.scorer
        } else {
            None
        };
        let ranked = trail.stage("rerank", || {
            rerank(survivors, self.config.rerank_n, &query.normalized_text, scorer)
        });

        let built = trail.stage("context", || {
            build_context(&ranked, self.config.evidence_budget)
        });
        if built.expected_citations.is_empty() {
            trail.outcome(GateOutcome::new(
                "context",
                GateDecision::Refuse,
                "no chunk fits the evidence budget",
            ));
            return ValidatedAnswer::refusal(RefusalReason::InsufficientEvidence);
        }

        if let Some(refusal) = cancelled_at(cancel, "before generation", trail) {
            return refusal;
        }

        let system = build_instructions(&built.expected_citations);
        let prompt = build_prompt(query, &built.text);
        let draft = match trail.stage("generate", || {
            generate_with_retry(
                self.generator,
                &system,
                &prompt,
                self.config.generation_retries,
                self.config.generation_backoff_ms,
            )
        }) {
            Ok(draft) => draft,
            Err(e) => {
                trail.outcome(GateOutcome::new("generate", GateDecision::Refuse, e.to_string()));
                return ValidatedAnswer::refusal(RefusalReason::GenerationUnavailable);
            }
        };

        let checked = trail.stage("citation_guard", || {
            citation::check_citations(
                &draft,
                &built.expected_citations,
                self.config.citation_tolerance,
            )
        });
        trail.outcome(checked.outcome.clone());
        if let Some(reason) = checked.refusal {
            return ValidatedAnswer::refusal(reason);
        }
        let citation_downgraded = checked.outcome.decision == GateDecision::Downgrade;

        let grounded = trail.stage("grounding_guard", || {
            grounding::check_grounding(
                checked.kept,
                &built.expected_citations,
                self.config.grounding_confidence,
            )
        });
        trail.outcome(grounded.outcome.clone());
        if let Some(reason) = grounded.refusal {
            return ValidatedAnswer::refusal(reason);
        }
        let downgraded = citation_downgraded || grounded.removed > 0;

        let validated = trail.stage("response_validator", || {
            response::finalize(
                &grounded.kept,
                &built.expected_citations,
                downgraded,
                self.config.min_partial_chars,
            )
        });
        trail.outcome(validated.outcome);
        match validated.result {
            Ok(answer) => ValidatedAnswer {
                text: answer.text,
                citations: answer.citations,
                status: answer.status,
                refusal_reason: None,
                emergency: false,
            },
            Err(reason) => ValidatedAnswer::refusal(reason),
        }
    }
}

fn cancelled_at(cancel: &CancelToken, at: &str, trail: &mut Trail) -> Option<ValidatedAnswer> {
    if !cancel.is_cancelled() {
        return None;
    }
    tracing::info!(at, "query cancelled");
    trail.outcome(GateOutcome::new(
        "cancelled",
        GateDecision::Refuse,
        format!("cancelled {at}"),
    ));
    Some(ValidatedAnswer::refusal(RefusalReason::Cancelled))
}
