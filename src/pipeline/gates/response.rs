//! Response validator.
//!
//! Last gate before the transport: assembles the surviving sentences into
//! the final answer text, resolves citations against the expected map, and
//! rejects anything malformed. Runs on every non-refused path, including
//! downgraded partials.

use super::{CitedSentence, GateDecision, GateOutcome, MARKER_PATTERN};
use crate::pipeline::types::{AnswerStatus, Citation, CitationMap, RefusalReason};

const GATE: &str = "response_validator";

/// Characters of chunk text surfaced as the citation excerpt.
const EXCERPT_CHARS: usize = 200;

/// Appended to every answered or partial response.
pub const DISCLAIMER: &str = "This is educational support, not a diagnosis. \
    Seek clinician evaluation for persistent, worsening, or severe symptoms.";

/// Outcome of the response validator.
#[derive(Debug)]
pub struct ResponseCheck {
    pub outcome: GateOutcome,
    pub result: Result<FinalAnswer, RefusalReason>,
}

/// Validated answer body and resolved citations.
#[derive(Debug)]
pub struct FinalAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub status: AnswerStatus,
}

/// Assemble and validate the final response.
///
/// `downgraded` is true when any earlier gate stripped content; the result
/// is then at best `partial`, and a body shorter than `min_partial_chars`
/// is judged too thin to stand on its own.
pub fn finalize(
    kept: &[CitedSentence],
    expected: &CitationMap,
    downgraded: bool,
    min_partial_chars: usize,
) -> ResponseCheck {
    let body = assemble_body(kept);

    if body.is_empty() {
        return refuse("validated answer body is empty", RefusalReason::ResponseInvalid);
    }
    if body.contains("[Source:") {
        return refuse(
            "citation marker survived stripping",
            RefusalReason::ResponseInvalid,
        );
    }
    if downgraded && min_partial_chars > 0 && body.len() < min_partial_chars {
        return refuse(
            "partial answer below minimum length",
            RefusalReason::UnsupportedClaims,
        );
    }

    let citations = resolve_citations(kept, expected);
    if citations.is_empty() {
        return refuse("no resolvable citations", RefusalReason::ResponseInvalid);
    }

    let status = if downgraded {
        AnswerStatus::Partial
    } else {
        AnswerStatus::Answered
    };
    let text = format!("{body}\n\n{DISCLAIMER}");

    ResponseCheck {
        outcome: GateOutcome::new(
            GATE,
            GateDecision::Pass,
            format!("{} sentences, {} citations", kept.len(), citations.len()),
        ),
        result: Ok(FinalAnswer {
            text,
            citations,
            status,
        }),
    }
}

fn refuse(detail: &str, reason: RefusalReason) -> ResponseCheck {
    ResponseCheck {
        outcome: GateOutcome::new(GATE, GateDecision::Refuse, detail),
        result: Err(reason),
    }
}

/// Join surviving sentences with markers stripped and spacing tidied.
fn assemble_body(kept: &[CitedSentence]) -> String {
    let mut parts = Vec::new();
    for sentence in kept {
        let stripped = MARKER_PATTERN.replace_all(&sentence.text, "");
        let tidied = stripped
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .replace(" .", ".")
            .replace(" ,", ",")
            .replace(" ;", ";");
        if !tidied.is_empty() {
            parts.push(tidied);
        }
    }
    parts.join(" ")
}

/// Resolve the unique cited chunk ids, in first-citation order.
fn resolve_citations(kept: &[CitedSentence], expected: &CitationMap) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();
    for sentence in kept {
        for id in &sentence.chunk_ids {
            if citations.iter().any(|c| &c.chunk_id == id) {
                continue;
            }
            if let Some(entry) = expected.get(id) {
                citations.push(Citation {
                    chunk_id: entry.chunk_id.clone(),
                    document_id: entry.document_id.clone(),
                    page: entry.page,
                    section: entry.section.clone(),
                    excerpt: excerpt(&entry.text),
                });
            }
        }
    }
    citations
}

fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let mut end = EXCERPT_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
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
                document_id: format!("doc-{id}"),
                page: Some(2),
                section: Some("Management".into()),
                text: "Extensively hydrolyzed formula is first-line for confirmed CMPA.".into(),
            });
        }
        map
    }

    fn cited(text: &str, ids: &[&str]) -> CitedSentence {
        CitedSentence {
            text: text.to_string(),
            chunk_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn clean_answer_passes_with_disclaimer() {
        let check = finalize(
            &[cited("Hydrolyzed formula is first-line [Source: c1].", &["c1"])],
            &expected(&["c1"]),
            false,
            0,
        );
        let answer = check.result.unwrap();
        assert_eq!(answer.status, AnswerStatus::Answered);
        assert!(answer.text.starts_with("Hydrolyzed formula is first-line."));
        assert!(answer.text.ends_with(DISCLAIMER));
        assert!(!answer.text.contains("[Source:"));
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].document_id, "doc-c1");
    }

    #[test]
    fn downgraded_answer_is_partial() {
        let check = finalize(
            &[cited("Kept sentence [Source: c1].", &["c1"])],
            &expected(&["c1"]),
            true,
            0,
        );
        assert_eq!(check.result.unwrap().status, AnswerStatus::Partial);
    }

    #[test]
    fn empty_body_refuses_response_invalid() {
        let check = finalize(&[], &expected(&["c1"]), true, 0);
        assert_eq!(check.result.unwrap_err(), RefusalReason::ResponseInvalid);
        assert_eq!(check.outcome.decision, GateDecision::Refuse);
    }

    #[test]
    fn thin_partial_refuses_unsupported_claims() {
        let check = finalize(
            &[cited("Short [Source: c1].", &["c1"])],
            &expected(&["c1"]),
            true,
            100,
        );
        assert_eq!(check.result.unwrap_err(), RefusalReason::UnsupportedClaims);
    }

    #[test]
    fn citations_deduplicated_in_first_citation_order() {
        let check = finalize(
            &[
                cited("One [Source: c2].", &["c2"]),
                cited("Two [Source: c1, c2].", &["c1", "c2"]),
            ],
            &expected(&["c1", "c2"]),
            false,
            0,
        );
        let answer = check.result.unwrap();
        let ids: Vec<&str> = answer.citations.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[test]
    fn excerpt_is_bounded() {
        let mut map = CitationMap::new();
        map.push(CitationEntry {
            chunk_id: "c1".into(),
            document_id: "d1".into(),
            page: None,
            section: None,
            text: "x".repeat(500),
        });
        let check = finalize(&[cited("Claim [Source: c1].", &["c1"])], &map, false, 0);
        let answer = check.result.unwrap();
        assert_eq!(answer.citations[0].excerpt.len(), 200);
    }
}
