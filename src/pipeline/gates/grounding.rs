//! Grounding guard.
//!
//! Checks each cited sentence against the text of the chunks it cites: an
//! entailment check against the evidence, not the query. The signal is
//! deterministic lexical containment: the fraction of the sentence's
//! content terms found in its cited evidence. Sentences scoring below the
//! configured confidence are removed; an emptied answer refuses with
//! `unsupported_claims`.

use super::{CitedSentence, GateDecision, GateOutcome, MARKER_PATTERN};
use crate::pipeline::types::{CitationMap, RefusalReason};

const GATE: &str = "grounding_guard";

/// Function words excluded from the entailment signal.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "your", "are", "was", "were", "has",
    "have", "had", "not", "but", "can", "may", "will", "should", "would", "could", "about",
    "into", "when", "what", "which", "their", "there", "been", "being", "also", "such", "than",
    "then", "them", "they", "you", "its", "per", "any", "all", "most", "some",
];

/// Outcome of the grounding guard.
#[derive(Debug)]
pub struct GroundingCheck {
    pub kept: Vec<CitedSentence>,
    pub removed: usize,
    pub outcome: GateOutcome,
    pub refusal: Option<RefusalReason>,
}

/// Remove cited sentences not entailed by their cited evidence.
pub fn check_grounding(
    sentences: Vec<CitedSentence>,
    expected: &CitationMap,
    confidence: f32,
) -> GroundingCheck {
    let had_input = !sentences.is_empty();
    let mut kept = Vec::new();
    let mut removed = 0usize;

    for sentence in sentences {
        let score = entailment_score(&sentence, expected);
        if score >= confidence {
            kept.push(sentence);
        } else {
            tracing::debug!(
                score,
                cited = ?sentence.chunk_ids,
                "sentence not entailed by cited evidence, removed"
            );
            removed += 1;
        }
    }

    if had_input && kept.is_empty() {
        return GroundingCheck {
            kept,
            removed,
            outcome: GateOutcome::new(
                GATE,
                GateDecision::Refuse,
                format!("all {removed} cited sentences failed entailment"),
            ),
            refusal: Some(RefusalReason::UnsupportedClaims),
        };
    }

    let decision = if removed == 0 {
        GateDecision::Pass
    } else {
        GateDecision::Downgrade
    };
    GroundingCheck {
        outcome: GateOutcome::new(
            GATE,
            decision,
            format!("{removed} sentences removed, {} kept", kept.len()),
        ),
        kept,
        removed,
        refusal: None,
    }
}

/// Fraction of the sentence's content terms present in its cited chunks.
///
/// A sentence with no content terms (pure markers or function words) has
/// nothing to check and scores 1.0.
fn entailment_score(sentence: &CitedSentence, expected: &CitationMap) -> f32 {
    let evidence: String = sentence
        .chunk_ids
        .iter()
        .filter_map(|id| expected.get(id))
        .map(|entry| entry.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let stripped = MARKER_PATTERN.replace_all(&sentence.text, "");
    let terms: Vec<String> = stripped
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect();

    if terms.is_empty() {
        return 1.0;
    }

    let hits = terms.iter().filter(|t| evidence.contains(t.as_str())).count();
    hits as f32 / terms.len() as f32
}
