//! Generator adapter.
//!
//! The pipeline supplies the assembled evidence context, the query, and an
//! instruction contract; it receives a raw draft with inline citation
//! markers. The adapter is an external collaborator; this module owns only
//! the contract, the retry policy, and a concrete HTTP implementation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{AnswerDraft, CitationMap, Query};

/// Marker the model must emit when the supplied context cannot answer the
/// question. The citation guard turns it into a refusal instead of letting
/// a speculative answer through.
pub const INSUFFICIENT_CONTEXT_MARKER: &str = "INSUFFICIENT_CONTEXT";

/// Generation failures.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation timed out")]
    Timeout,

    #[error("generator unreachable: {0}")]
    Unavailable(String),

    #[error("generator error: {0}")]
    Failed(String),
}

/// Text generation capability.
pub trait Generate {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, GenerationError>;

    /// Identifier recorded in the draft's model metadata.
    fn model_id(&self) -> &str {
        "unknown"
    }
}

/// The instruction contract sent as the system prompt.
///
/// Three rules, in the order the validation gates check them: cite
/// everything, claim nothing beyond the context, say so explicitly when the
/// context is not enough.
pub fn build_instructions(expected: &CitationMap) -> String {
    format!(
        "You answer medical questions using ONLY the evidence excerpts provided.\n\
         Rules:\n\
         1. Every factual sentence must end with a citation marker of the form \
         [Source: chunk_id] naming one or more of these chunk ids: {ids}. \
         Separate multiple ids with commas.\n\
         2. Never state anything that is not directly supported by the excerpts. \
         Do not use outside knowledge.\n\
         3. If the excerpts do not contain enough information to answer, reply \
         with exactly {marker} and nothing else.\n\
         4. Do not diagnose, prescribe, or give emergency instructions.",
        ids = expected.ids().join(", "),
        marker = INSUFFICIENT_CONTEXT_MARKER,
    )
}

/// The user prompt: evidence first, then the question.
pub fn build_prompt(query: &Query, context: &str) -> String {
    format!(
        "<EVIDENCE>\n{context}\n</EVIDENCE>\n\n\
         Question: {question}\n\n\
         Answer using only the evidence above.",
        question = query.raw_text.trim(),
    )
}

/// Call the generator with the configured retry budget.
///
/// `retries` extra attempts follow the first failure, each after
/// `backoff_ms * attempt_number`. Timeouts and transport failures are
/// retried alike; the last error propagates when the budget is exhausted.
pub fn generate_with_retry(
    generator: &dyn Generate,
    system: &str,
    prompt: &str,
    retries: u32,
    backoff_ms: u64,
) -> Result<AnswerDraft, GenerationError> {
    let mut attempt = 0;
    loop {
        match generator.generate(system, prompt) {
            Ok(text) => {
                return Ok(AnswerDraft {
                    text,
                    model: generator.model_id().to_string(),
                })
            }
            Err(e) if attempt < retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "generation failed, retrying with backoff");
                std::thread::sleep(std::time::Duration::from_millis(backoff_ms * u64::from(attempt)));
            }
            Err(e) => {
                tracing::warn!(attempts = attempt + 1, error = %e, "generation failed, giving up");
                return Err(e);
            }
        }
    }
}

/// Request body for an Ollama-style /api/generate endpoint.
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// Response body from an Ollama-style /api/generate endpoint.
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP generator backed by a local model server (Ollama-compatible).
pub struct HttpGenerator {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl HttpGenerator {
    pub fn new(base_url: &str, model: &str, timeout_ms: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }
}

impl Generate for HttpGenerator {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else if e.is_connect() {
                GenerationError::Unavailable(self.base_url.clone())
            } else {
                GenerationError::Failed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Failed(format!(
                "generator returned HTTP {status}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| GenerationError::Failed(e.to_string()))?;
        Ok(parsed.response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
