//! Citation guard.
//!
//! Every factual sentence in the draft must cite at least one chunk id
//! that was actually shown to the generator. Sentences with no marker, or
//! referencing an id outside the expected map, are flagged. Within the
//! configured tolerance flagged sentences are stripped (downgrade to
//! partial); beyond it the whole draft is refused.
//!
//! Tolerance rounding convention: the fraction converts to a whole-sentence
//! allowance, `allowed = ceil(tolerance * total)`; the guard refuses only
//! when `flagged > allowed`.

use super::{CitedSentence, GateDecision, GateOutcome, MARKER_PATTERN};
use crate::pipeline::generator::INSUFFICIENT_CONTEXT_MARKER;
use crate::pipeline::types::{AnswerDraft, CitationMap, RefusalReason};

const GATE: &str = "citation_guard";

/// Outcome of the citation guard.
#[derive(Debug)]
pub struct CitationCheck {
    /// Sentences that survived, in draft order, with validated chunk ids.
    pub kept: Vec<CitedSentence>,
    pub stripped: usize,
    pub total: usize,
    pub outcome: GateOutcome,
    pub refusal: Option<RefusalReason>,
}

/// Evaluate the draft against the expected citation map.
pub fn check_citations(draft: &AnswerDraft, expected: &CitationMap, tolerance: f32) -> CitationCheck {
    if draft.text.contains(INSUFFICIENT_CONTEXT_MARKER) {
        return CitationCheck {
            kept: vec![],
            stripped: 0,
            total: 0,
            outcome: GateOutcome::new(
                GATE,
                GateDecision::Refuse,
                "model reported insufficient context",
            ),
            refusal: Some(RefusalReason::CitationIncomplete),
        };
    }

    let sentences = split_sentences(&draft.text);
    let total = sentences.len();

    let mut kept = Vec::new();
    let mut flagged = 0usize;
    for sentence in sentences {
        let ids = cited_ids(&sentence);
        let all_known = !ids.is_empty() && ids.iter().all(|id| expected.contains(id));
        if all_known {
            kept.push(CitedSentence {
                text: sentence,
                chunk_ids: ids,
            });
        } else {
            tracing::debug!(
                cited = ?ids,
                "sentence uncited or references unknown chunk id, flagged"
            );
            flagged += 1;
        }
    }

    let allowed = (tolerance * total as f32).ceil() as usize;
    if flagged > allowed {
        return CitationCheck {
            kept: vec![],
            stripped: 0,
            total,
            outcome: GateOutcome::new(
                GATE,
                GateDecision::Refuse,
                format!("{flagged} of {total} sentences uncited exceeds allowance {allowed}"),
            ),
            refusal: Some(RefusalReason::CitationIncomplete),
        };
    }

    let decision = if flagged == 0 {
        GateDecision::Pass
    } else {
        GateDecision::Downgrade
    };
    CitationCheck {
        kept,
        stripped: flagged,
        total,
        outcome: GateOutcome::new(
            GATE,
            decision,
            format!("{flagged} of {total} sentences stripped (allowance {allowed})"),
        ),
        refusal: None,
    }
}

/// Chunk ids cited by one sentence, in marker order, deduplicated.
fn cited_ids(sentence: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for capture in MARKER_PATTERN.captures_iter(sentence) {
        if let Some(group) = capture.get(1) {
            for id in group.as_str().split(',') {
                let id = id.trim().to_string();
                if !id.is_empty() && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}

/// Abbreviations whose trailing period is not a sentence boundary.
const ABBREVIATIONS: &[&str] = &[
    "Dr.", "Mr.", "Mrs.", "Ms.", "Prof.", "vs.", "etc.", "e.g.", "i.e.", "approx.", "no.",
];

fn ends_with_abbreviation(prefix: &str) -> bool {
    ABBREVIATIONS.iter().any(|abbr| {
        prefix.len() >= abbr.len()
            && prefix[prefix.len() - abbr.len()..].eq_ignore_ascii_case(abbr)
    })
}

/// Split draft text into sentences.
///
/// Byte-wise scan over terminal punctuation followed by whitespace or end
/// of text; newlines always split. Abbreviations and decimals ("0.5 mg" has
/// a digit, not whitespace, after the period) do not split.
pub(super) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c == b'.' || c == b'!' || c == b'?' {
            if c == b'.' && ends_with_abbreviation(&text[..=i]) {
                i += 1;
                continue;
            }
            let end = i + 1;
            let boundary = text[end..]
                .chars()
                .next()
                .map_or(true, |next| next.is_whitespace());
            if boundary {
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end;
            }
        } else if c == b'\n' {
            let sentence = text[start..i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = i + 1;
        }
        i += 1;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::CitationEntry;

    fn expected(ids: &[&str]) -> CitationMap {
        let mut map = CitationMap::new();
        for id in ids {
            map.push(CitationEntry {
                chunk_id: id.to_string(),
                document_id: "d1".into(),
                page: None,
                section: None,
                text: "evidence".into(),
            });
        }
        map
    }

    fn draft(text: &str) -> AnswerDraft {
        AnswerDraft {
            text: text.to_string(),
            model: "test".into(),
        }
    }

    #[test]
    fn fully_cited_draft_passes() {
        let d = draft("CMPA affects the gut [Source: c1]. Symptoms vary [Source: c2].");
        let check = check_citations(&d, &expected(&["c1", "c2"]), 0.2);
        assert_eq!(check.outcome.decision, GateDecision::Pass);
        assert_eq!(check.kept.len(), 2);
        assert!(check.refusal.is_none());
    }

    #[test]
    fn one_uncited_of_three_is_stripped_within_tolerance() {
        let d = draft(
            "CMPA affects the gut [Source: c1]. \
             Milk should be avoided [Source: c2]. \
             Most infants outgrow it by age five.",
        );
        let check = check_citations(&d, &expected(&["c1", "c2"]), 0.2);
        // ceil(0.2 * 3) = 1 sentence allowance.
        assert_eq!(check.outcome.decision, GateDecision::Downgrade);
        assert_eq!(check.stripped, 1);
        assert_eq!(check.kept.len(), 2);
        // Surviving sentences are kept verbatim.
        assert_eq!(check.kept[0].text, "CMPA affects the gut [Source: c1].");
        assert_eq!(check.kept[1].text, "Milk should be avoided [Source: c2].");
    }

    #[test]
    fn mostly_uncited_draft_is_refused() {
        let d = draft("First claim. Second claim. Third claim [Source: c1].");
        let check = check_citations(&d, &expected(&["c1"]), 0.2);
        assert_eq!(check.outcome.decision, GateDecision::Refuse);
        assert_eq!(check.refusal, Some(RefusalReason::CitationIncomplete));
        assert!(check.kept.is_empty());
    }

    #[test]
    fn unknown_chunk_id_flags_sentence() {
        let d = draft("Claim one [Source: c1]. Claim two [Source: zz9].");
        let check = check_citations(&d, &expected(&["c1"]), 0.5);
        assert_eq!(check.stripped, 1);
        assert_eq!(check.kept.len(), 1);
        assert_eq!(check.kept[0].chunk_ids, vec!["c1"]);
    }

    #[test]
    fn multi_id_marker_parses_all_ids() {
        let d = draft("Combined evidence claim [Source: c1, c2].");
        let check = check_citations(&d, &expected(&["c1", "c2"]), 0.0);
        assert_eq!(check.kept[0].chunk_ids, vec!["c1", "c2"]);
    }

    #[test]
    fn insufficiency_marker_refuses() {
        let d = draft(INSUFFICIENT_CONTEXT_MARKER);
        let check = check_citations(&d, &expected(&["c1"]), 1.0);
        assert_eq!(check.refusal, Some(RefusalReason::CitationIncomplete));
        assert!(check.outcome.detail.contains("insufficient context"));
    }

    #[test]
    fn zero_tolerance_refuses_any_uncited_sentence() {
        let d = draft("Cited [Source: c1]. Uncited claim here.");
        let check = check_citations(&d, &expected(&["c1"]), 0.0);
        assert_eq!(check.refusal, Some(RefusalReason::CitationIncomplete));
    }

    #[test]
    fn empty_draft_passes_through_empty() {
        let check = check_citations(&draft(""), &expected(&["c1"]), 0.2);
        assert_eq!(check.total, 0);
        assert!(check.kept.is_empty());
        assert!(check.refusal.is_none());
    }

    #[test]
    fn split_handles_abbreviations_and_decimals() {
        let sentences = split_sentences("Dr. Chen suggests 0.5 mg daily [Source: c1]. Next point.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("Dr. Chen"));
    }

    #[test]
    fn split_on_newlines() {
        let sentences = split_sentences("First line without period\nSecond line.");
        assert_eq!(sentences.len(), 2);
    }
}
