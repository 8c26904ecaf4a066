//! Threshold filter.
//!
//! Pure function over the candidate set: drops every chunk scoring below
//! the configured minimum similarity. Holds no policy about what the right
//! threshold is; tuning lives outside the pipeline.

use super::types::CandidateSet;

/// Remove every candidate with `similarity < min_similarity`.
///
/// Survivors keep their order; nothing is ever added. An empty result is
/// the orchestrator's cue to refuse with `insufficient_evidence`.
pub fn filter_by_similarity(candidates: CandidateSet, min_similarity: f32) -> CandidateSet {
    candidates
        .into_iter()
        .filter(|c| c.similarity >= min_similarity)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{EvidenceChunk, ScoredChunk};

    fn scored(id: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: EvidenceChunk {
                chunk_id: id.to_string(),
                document_id: "d1".into(),
                page: None,
                section: None,
                text: "text".into(),
            },
            similarity,
        }
    }

    #[test]
    fn no_survivor_below_threshold() {
        let input = vec![scored("a", 0.9), scored("b", 0.4), scored("c", 0.75)];
        let out = filter_by_similarity(input, 0.75);
        assert!(out.iter().all(|c| c.similarity >= 0.75));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn survivors_keep_input_order() {
        let input = vec![scored("low", 0.8), scored("high", 0.95), scored("mid", 0.85)];
        let out = filter_by_similarity(input, 0.5);
        let ids: Vec<_> = out.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["low", "high", "mid"]);
    }

    #[test]
    fn output_is_subset_of_input() {
        let input = vec![scored("a", 0.3), scored("b", 0.6)];
        let input_ids: Vec<String> = input.iter().map(|c| c.chunk.chunk_id.clone()).collect();
        let out = filter_by_similarity(input, 0.5);
        assert!(out.iter().all(|c| input_ids.contains(&c.chunk.chunk_id)));
    }

    #[test]
    fn all_below_threshold_yields_empty() {
        let input = vec![scored("a", 0.3), scored("b", 0.3)];
        assert!(filter_by_similarity(input, 0.5).is_empty());
    }

    #[test]
    fn boundary_score_survives() {
        let out = filter_by_similarity(vec![scored("a", 0.5)], 0.5);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn empty_input_yields_empty() {
        assert!(filter_by_similarity(vec![], 0.9).is_empty());
    }
}
