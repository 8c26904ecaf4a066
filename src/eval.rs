//! Offline evaluation harness.
//!
//! Replays a gold question set through a pipeline and aggregates retrieval
//! accuracy (top-k and top-1), hallucination rate, refusal rate, and
//! response latency. Meant for offline quality runs against a frozen
//! corpus and configuration, not for the serving path.
//!
//! Gold sets and reports are JSON. A case is a hallucination when a
//! non-refused answer cites any chunk outside the case's gold set.

use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::audit::InMemoryAuditSink;
use crate::pipeline::orchestrator::AnswerPipeline;
use crate::pipeline::types::{AnswerStatus, Query};

/// One gold question with the chunk ids a correct retrieval should surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldCase {
    pub question_id: String,
    pub question: String,
    pub gold_chunk_ids: Vec<String>,
}

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("gold set read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gold set parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate question id: {0}")]
    DuplicateCase(String),
}

/// Load a gold set from a JSON array, rejecting duplicate question ids.
pub fn load_gold_cases(path: &Path) -> Result<Vec<GoldCase>, EvalError> {
    let raw = fs::read_to_string(path)?;
    let cases: Vec<GoldCase> = serde_json::from_str(&raw)?;

    let mut seen: Vec<&str> = Vec::new();
    for case in &cases {
        if seen.contains(&case.question_id.as_str()) {
            return Err(EvalError::DuplicateCase(case.question_id.clone()));
        }
        seen.push(&case.question_id);
    }
    Ok(cases)
}

/// Per-case outcome kept alongside the aggregate metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub question_id: String,
    pub retrieved_chunk_ids: Vec<String>,
    pub cited_chunk_ids: Vec<String>,
    pub refused: bool,
    pub hallucinated: bool,
    pub response_time_ms: u64,
}

/// Aggregate metrics over one gold set run.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub total_questions: usize,
    pub retrieval_accuracy_topk: f32,
    pub retrieval_accuracy_top1: f32,
    pub hallucination_rate: f32,
    pub refusal_rate: f32,
    pub avg_response_time_ms: f32,
    pub p95_response_time_ms: u64,
    pub cases: Vec<CaseResult>,
}

impl EvalReport {
    /// Write the report as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<(), EvalError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Replay every gold case through the pipeline and aggregate metrics.
///
/// `audit` must be the sink the pipeline was constructed with; the harness
/// reads each case's retrieved chunk ids from the record the run appended.
pub fn run_eval(
    pipeline: &AnswerPipeline<'_>,
    audit: &InMemoryAuditSink,
    cases: &[GoldCase],
) -> EvalReport {
    let mut results = Vec::with_capacity(cases.len());

    for case in cases {
        let query = Query::new(&case.question, "en");
        let started = Instant::now();
        let answer = pipeline.answer(&query);
        let response_time_ms = started.elapsed().as_millis() as u64;

        let retrieved_chunk_ids = audit
            .records()
            .last()
            .map(|record| record.retrieved_chunk_ids.clone())
            .unwrap_or_default();
        let cited_chunk_ids: Vec<String> = answer
            .citations
            .iter()
            .map(|c| c.chunk_id.clone())
            .collect();

        let refused = answer.status == AnswerStatus::Refused;
        let hallucinated = !refused
            && cited_chunk_ids
                .iter()
                .any(|id| !case.gold_chunk_ids.contains(id));

        results.push(CaseResult {
            question_id: case.question_id.clone(),
            retrieved_chunk_ids,
            cited_chunk_ids,
            refused,
            hallucinated,
            response_time_ms,
        });
    }

    summarize(cases, results)
}

fn summarize(cases: &[GoldCase], results: Vec<CaseResult>) -> EvalReport {
    let total = results.len();
    if total == 0 {
        return EvalReport {
            total_questions: 0,
            retrieval_accuracy_topk: 0.0,
            retrieval_accuracy_top1: 0.0,
            hallucination_rate: 0.0,
            refusal_rate: 0.0,
            avg_response_time_ms: 0.0,
            p95_response_time_ms: 0,
            cases: results,
        };
    }

    let mut topk_hits = 0usize;
    let mut top1_hits = 0usize;
    let mut refusals = 0usize;
    let mut hallucinations = 0usize;
    let mut times: Vec<u64> = Vec::with_capacity(total);

    for (case, result) in cases.iter().zip(&results) {
        times.push(result.response_time_ms);
        if result.refused {
            refusals += 1;
        }
        if result.hallucinated {
            hallucinations += 1;
        }
        if result
            .retrieved_chunk_ids
            .iter()
            .any(|id| case.gold_chunk_ids.contains(id))
        {
            topk_hits += 1;
        }
        if result
            .retrieved_chunk_ids
            .first()
            .is_some_and(|id| case.gold_chunk_ids.contains(id))
        {
            top1_hits += 1;
        }
    }

    times.sort_unstable();
    let p95_index = ((0.95 * total as f32) as usize).saturating_sub(1);
    let sum: u64 = times.iter().sum();

    EvalReport {
        total_questions: total,
        retrieval_accuracy_topk: topk_hits as f32 / total as f32,
        retrieval_accuracy_top1: top1_hits as f32 / total as f32,
        hallucination_rate: hallucinations as f32 / total as f32,
        refusal_rate: refusals as f32 / total as f32,
        avg_response_time_ms: sum as f32 / total as f32,
        p95_response_time_ms: times[p95_index],
        cases: results,
    }
}
