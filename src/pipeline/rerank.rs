//! Optional rerank stage.
//!
//! Reorders threshold survivors by a finer relevance signal and truncates
//! to the configured size. Strictly an optimization: a scorer failure
//! degrades to the identity truncation (log-and-continue) rather than
//! failing the query.

use thiserror::Error;

use super::types::{CandidateSet, EvidenceChunk};

/// Pairwise relevance scoring capability.
#[derive(Error, Debug)]
#[error("relevance scorer failed: {0}")]
pub struct ScorerError(pub String);

pub trait RelevanceScorer {
    /// Higher means more relevant to the query.
    fn score(&self, query: &str, chunk: &EvidenceChunk) -> Result<f32, ScorerError>;
}

/// Rerank `candidates` and truncate to at most `n`.
///
/// With no scorer, or when any scoring call fails, this is the identity
/// truncation by existing similarity order. Total over any input.
pub fn rerank(
    candidates: CandidateSet,
    n: usize,
    query: &str,
    scorer: Option<&dyn RelevanceScorer>,
) -> CandidateSet {
    let keep = n.min(candidates.len());

    let Some(scorer) = scorer else {
        return truncate(candidates, keep);
    };

    let mut scores = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        match scorer.score(query, &candidate.chunk) {
            Ok(score) => scores.push(score),
            Err(e) => {
                tracing::warn!(
                    chunk_id = %candidate.chunk.chunk_id,
                    error = %e,
                    "relevance scorer failed, keeping similarity order"
                );
                return truncate(candidates, keep);
            }
        }
    }

    let mut indexed: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
    // Stable sort: equal scores keep similarity order.
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let order: Vec<usize> = indexed.into_iter().take(keep).map(|(i, _)| i).collect();
    let mut slots: Vec<Option<super::types::ScoredChunk>> =
        candidates.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

fn truncate(mut candidates: CandidateSet, keep: usize) -> CandidateSet {
    candidates.truncate(keep);
    candidates
}

/// Default scorer: fraction of the query's content terms present in the
/// chunk text. Cheap, deterministic, and good enough to promote chunks
/// that mention the question's actual terms.
pub struct LexicalOverlapScorer;

impl RelevanceScorer for LexicalOverlapScorer {
    fn score(&self, query: &str, chunk: &EvidenceChunk) -> Result<f32, ScorerError> {
        let text = chunk.text.to_lowercase();
        let terms: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 3)
            .map(str::to_string)
            .collect();

        if terms.is_empty() {
            return Ok(0.0);
        }

        let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
        Ok(hits as f32 / terms.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ScoredChunk;

    fn scored(id: &str, text: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: EvidenceChunk {
                chunk_id: id.to_string(),
                document_id: "d1".into(),
                page: None,
                section: None,
                text: text.to_string(),
            },
            similarity,
        }
    }

    struct BrokenScorer;

    impl RelevanceScorer for BrokenScorer {
        fn score(&self, _query: &str, _chunk: &EvidenceChunk) -> Result<f32, ScorerError> {
            Err(ScorerError("model not loaded".into()))
        }
    }

    #[test]
    fn output_size_bounded_by_n_and_input() {
        let input = vec![
            scored("a", "one", 0.9),
            scored("b", "two", 0.8),
            scored("c", "three", 0.7),
        ];
        assert_eq!(rerank(input.clone(), 2, "q", None).len(), 2);
        assert_eq!(rerank(input, 10, "q", None).len(), 3);
    }

    #[test]
    fn disabled_rerank_preserves_order() {
        let input = vec![
            scored("a", "one", 0.9),
            scored("b", "two", 0.8),
            scored("c", "three", 0.7),
        ];
        let out = rerank(input, 2, "q", None);
        let ids: Vec<_> = out.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn lexical_scorer_promotes_matching_chunk() {
        let input = vec![
            scored("a", "general feeding advice for toddlers", 0.9),
            scored("b", "soy formula is a common milk alternative", 0.8),
        ];
        let out = rerank(input, 2, "soy formula alternative", Some(&LexicalOverlapScorer));
        assert_eq!(out[0].chunk.chunk_id, "b");
    }

    #[test]
    fn scorer_failure_degrades_to_identity() {
        let input = vec![scored("a", "one", 0.9), scored("b", "two", 0.8)];
        let out = rerank(input, 1, "q", Some(&BrokenScorer));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].chunk.chunk_id, "a");
    }

    #[test]
    fn equal_scores_keep_similarity_order() {
        let input = vec![
            scored("a", "milk allergy", 0.9),
            scored("b", "milk allergy", 0.8),
        ];
        let out = rerank(input, 2, "milk allergy", Some(&LexicalOverlapScorer));
        let ids: Vec<_> = out.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn empty_input_is_total() {
        assert!(rerank(vec![], 3, "q", Some(&LexicalOverlapScorer)).is_empty());
    }

    #[test]
    fn lexical_scorer_empty_query_scores_zero() {
        let score = LexicalOverlapScorer
            .score("a?!", &scored("a", "text", 0.5).chunk)
            .unwrap();
        assert_eq!(score, 0.0);
    }
}
