//! Evidence context assembly.
//!
//! Concatenates surviving chunk texts into the block shown to the
//! generator, within the configured evidence budget. Chunks are included
//! whole or not at all: a citation must always refer to a complete chunk,
//! so an overflowing chunk is skipped, never truncated mid-text.
//!
//! The expected citation map built here is the ground truth the validation
//! gates check the generator's citations against.

use super::types::{CitationEntry, CitationMap, ScoredChunk};

/// Assembled evidence context plus the expected citation map.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub text: String,
    pub expected_citations: CitationMap,
}

/// Assemble candidate chunks into a budgeted context block.
///
/// Candidates are taken in the order given (the set is never reordered
/// after this point). Each included chunk is labeled with the citation
/// marker the generator is instructed to reuse.
pub fn build_context(candidates: &[ScoredChunk], evidence_budget: usize) -> BuiltContext {
    let mut text = String::new();
    let mut expected_citations = CitationMap::new();

    for candidate in candidates {
        let block = format_chunk(candidate);
        let separator_len = if text.is_empty() { 0 } else { 2 };

        if text.len() + separator_len + block.len() > evidence_budget {
            tracing::debug!(
                chunk_id = %candidate.chunk.chunk_id,
                block_len = block.len(),
                used = text.len(),
                budget = evidence_budget,
                "chunk skipped, would exceed evidence budget"
            );
            continue;
        }

        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&block);

        expected_citations.push(CitationEntry {
            chunk_id: candidate.chunk.chunk_id.clone(),
            document_id: candidate.chunk.document_id.clone(),
            page: candidate.chunk.page,
            section: candidate.chunk.section.clone(),
            text: candidate.chunk.text.clone(),
        });
    }

    BuiltContext {
        text,
        expected_citations,
    }
}

fn format_chunk(candidate: &ScoredChunk) -> String {
    let mut block = format!("[Source: {}]", candidate.chunk.chunk_id);
    if let Some(ref section) = candidate.chunk.section {
        block.push_str(&format!(" [Section: {section}]"));
    }
    block.push('\n');
    block.push_str(&candidate.chunk.text);
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::EvidenceChunk;

    fn scored(id: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: EvidenceChunk {
                chunk_id: id.to_string(),
                document_id: format!("doc-{id}"),
                page: Some(3),
                section: Some("Diagnosis".into()),
                text: text.to_string(),
            },
            similarity: 0.9,
        }
    }

    #[test]
    fn all_chunks_fit_small_corpus() {
        let built = build_context(&[scored("c1", "First."), scored("c2", "Second.")], 1_000);
        assert!(built.text.contains("[Source: c1]"));
        assert!(built.text.contains("[Source: c2]"));
        assert_eq!(built.expected_citations.ids(), vec!["c1", "c2"]);
    }

    #[test]
    fn included_chunk_text_is_complete() {
        let body = "Skin prick testing alone cannot confirm CMPA diagnosis.";
        let built = build_context(&[scored("c1", body)], 1_000);
        // Never a partial chunk: the full text must appear verbatim.
        assert!(built.text.contains(body));
        assert_eq!(built.expected_citations.get("c1").unwrap().text, body);
    }

    #[test]
    fn overflowing_chunk_is_skipped_not_truncated() {
        let big = "B".repeat(500);
        let small = "Small chunk.";
        let built = build_context(&[scored("big", &big), scored("small", small)], 120);

        assert!(!built.text.contains('B'));
        assert!(built.text.contains(small));
        assert_eq!(built.expected_citations.ids(), vec!["small"]);
    }

    #[test]
    fn map_matches_included_chunks_in_order() {
        let built = build_context(
            &[scored("c2", "Two."), scored("c1", "One."), scored("c3", "Three.")],
            1_000,
        );
        assert_eq!(built.expected_citations.ids(), vec!["c2", "c1", "c3"]);
        let first = built.text.find("[Source: c2]").unwrap();
        let second = built.text.find("[Source: c1]").unwrap();
        assert!(first < second);
    }

    #[test]
    fn empty_candidates_build_empty_context() {
        let built = build_context(&[], 1_000);
        assert!(built.text.is_empty());
        assert!(built.expected_citations.is_empty());
    }

    #[test]
    fn budget_is_respected() {
        let chunks: Vec<ScoredChunk> = (0..50)
            .map(|i| scored(&format!("c{i}"), &"evidence text ".repeat(10)))
            .collect();
        let built = build_context(&chunks, 800);
        assert!(built.text.len() <= 800);
        assert!(built.expected_citations.len() < 50);
    }
}
