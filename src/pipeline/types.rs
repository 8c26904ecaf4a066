use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's question, normalized once at the transport boundary.
///
/// Immutable for the duration of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub raw_text: String,
    pub normalized_text: String,
    pub locale: String,
    pub session_ref: Option<Uuid>,
}

impl Query {
    pub fn new(raw_text: &str, locale: &str) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            normalized_text: normalize(raw_text),
            locale: locale.to_string(),
            session_ref: None,
        }
    }

    pub fn with_session(raw_text: &str, locale: &str, session_ref: Uuid) -> Self {
        Self {
            session_ref: Some(session_ref),
            ..Self::new(raw_text, locale)
        }
    }
}

/// Lowercase, trim, collapse runs of whitespace.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A contiguous excerpt of corpus text with its provenance.
///
/// Owned by the vector index; the pipeline treats it as read-only evidence
/// for the lifetime of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub page: Option<u32>,
    pub section: Option<String>,
    pub text: String,
}

/// An evidence chunk with its normalized similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: EvidenceChunk,
    /// Cosine similarity clamped to [0, 1].
    pub similarity: f32,
}

/// Ordered candidate evidence. Narrowed in place across stages; never
/// reordered after the context builder reads it, never holds a duplicate
/// chunk_id.
pub type CandidateSet = Vec<ScoredChunk>;

/// Scope classification decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub in_scope: bool,
    pub reason: String,
}

/// One entry of the expected citation map: a chunk actually shown to the
/// generator, with the attribution its citations resolve to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub page: Option<u32>,
    pub section: Option<String>,
    /// Full chunk text, for entailment checks.
    pub text: String,
}

/// Order-preserving map from chunk_id to source attribution.
///
/// Built by the context builder; the single source of truth for what
/// evidence the generator was shown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationMap {
    entries: Vec<CitationEntry>,
}

impl CitationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, ignoring duplicate chunk ids.
    pub fn push(&mut self, entry: CitationEntry) {
        if !self.contains(&entry.chunk_id) {
            self.entries.push(entry);
        }
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.entries.iter().any(|e| e.chunk_id == chunk_id)
    }

    pub fn get(&self, chunk_id: &str) -> Option<&CitationEntry> {
        self.entries.iter().find(|e| e.chunk_id == chunk_id)
    }

    pub fn entries(&self) -> &[CitationEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.chunk_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Raw generator output before validation. Consumed only by the gate chain.
#[derive(Debug, Clone)]
pub struct AnswerDraft {
    pub text: String,
    pub model: String,
}

/// A citation resolved for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub page: Option<u32>,
    pub section: Option<String>,
    pub excerpt: String,
}

/// Terminal outcome category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    Partial,
    Refused,
}

/// Machine-readable refusal reason.
///
/// Only the generic user-safe message leaves the pipeline; the reason code
/// itself is recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    OutOfScope,
    InsufficientEvidence,
    RetrievalUnavailable,
    GenerationUnavailable,
    CitationIncomplete,
    UnsupportedClaims,
    ResponseInvalid,
    Cancelled,
    InternalError,
}

impl RefusalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfScope => "out_of_scope",
            Self::InsufficientEvidence => "insufficient_evidence",
            Self::RetrievalUnavailable => "retrieval_unavailable",
            Self::GenerationUnavailable => "generation_unavailable",
            Self::CitationIncomplete => "citation_incomplete",
            Self::UnsupportedClaims => "unsupported_claims",
            Self::ResponseInvalid => "response_invalid",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internal_error",
        }
    }

    /// Fixed user-safe text per category. Never echoes internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::OutOfScope => {
                "I can only help with medical questions covered by my knowledge base.\n\
                 Please ask about symptoms, diagnosis, management, emergency red flags, \
                 or safe feeding alternatives."
            }
            Self::InsufficientEvidence | Self::UnsupportedClaims => {
                "I couldn't find enough reliable evidence in my knowledge base to \
                 answer that safely. Please rephrase, or ask your healthcare provider."
            }
            Self::CitationIncomplete | Self::ResponseInvalid => {
                "I couldn't produce a fully supported answer for that question. \
                 Please rephrase, or ask your healthcare provider."
            }
            Self::RetrievalUnavailable | Self::GenerationUnavailable | Self::InternalError => {
                "I couldn't complete your request right now due to a temporary \
                 processing issue.\nPlease try again in a moment."
            }
            Self::Cancelled => "The request was cancelled.",
        }
    }
}

/// Terminal artifact returned to the transport. The single terminal state of
/// one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub status: AnswerStatus,
    pub refusal_reason: Option<RefusalReason>,
    /// Set only by the emergency red-flag branch.
    pub emergency: bool,
}

impl ValidatedAnswer {
    pub fn refusal(reason: RefusalReason) -> Self {
        Self {
            text: reason.user_message().to_string(),
            citations: vec![],
            status: AnswerStatus::Refused,
            refusal_reason: Some(reason),
            emergency: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_normalization_collapses_whitespace() {
        let query = Query::new("  What   is\nCMPA? ", "en");
        assert_eq!(query.normalized_text, "what is cmpa?");
        assert_eq!(query.raw_text, "  What   is\nCMPA? ");
    }

    #[test]
    fn citation_map_ignores_duplicate_ids() {
        let mut map = CitationMap::new();
        for _ in 0..2 {
            map.push(CitationEntry {
                chunk_id: "c1".into(),
                document_id: "d1".into(),
                page: None,
                section: None,
                text: "Some evidence".into(),
            });
        }
        assert_eq!(map.len(), 1);
        assert!(map.contains("c1"));
        assert!(!map.contains("c2"));
    }

    #[test]
    fn citation_map_preserves_insertion_order() {
        let mut map = CitationMap::new();
        for id in ["c3", "c1", "c2"] {
            map.push(CitationEntry {
                chunk_id: id.into(),
                document_id: "d".into(),
                page: None,
                section: None,
                text: String::new(),
            });
        }
        assert_eq!(map.ids(), vec!["c3", "c1", "c2"]);
    }

    #[test]
    fn refusal_reason_serializes_snake_case() {
        let json = serde_json::to_string(&RefusalReason::OutOfScope).unwrap();
        assert_eq!(json, "\"out_of_scope\"");
        let json = serde_json::to_string(&RefusalReason::InsufficientEvidence).unwrap();
        assert_eq!(json, "\"insufficient_evidence\"");
    }

    #[test]
    fn refusal_answer_carries_generic_message_only() {
        let answer = ValidatedAnswer::refusal(RefusalReason::RetrievalUnavailable);
        assert_eq!(answer.status, AnswerStatus::Refused);
        assert!(answer.citations.is_empty());
        assert!(answer.text.contains("try again"));
        assert!(!answer.text.contains("retrieval"));
    }
}
