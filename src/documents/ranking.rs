//! Reciprocal Rank Fusion (RRF) for combining ranked passage lists.
//!
//! RRF score = sum(1 / (k + rank_i)) over every list a passage appears in.

use std::collections::HashMap;

/// Standard constant from the original RRF paper.
const RRF_K: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk_id: usize,
    pub keyword_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub rrf_score: f64,
}

/// Fuse keyword and vector rankings, best first.
///
/// Both inputs are `(chunk_id, score)` pairs already ordered best first; only
/// the order matters.
pub fn reciprocal_rank_fusion(
    keyword_results: &[(usize, f64)],
    vector_results: &[(usize, f64)],
) -> Vec<RankedChunk> {
    let mut scores: HashMap<usize, RankedChunk> = HashMap::new();

    for (rank, (chunk_id, _)) in keyword_results.iter().enumerate() {
        let e = entry(&mut scores, *chunk_id);
        e.keyword_rank = Some(rank + 1);
        e.rrf_score += 1.0 / (RRF_K + (rank + 1) as f64);
    }
    for (rank, (chunk_id, _)) in vector_results.iter().enumerate() {
        let e = entry(&mut scores, *chunk_id);
        e.vector_rank = Some(rank + 1);
        e.rrf_score += 1.0 / (RRF_K + (rank + 1) as f64);
    }

    let mut results: Vec<RankedChunk> = scores.into_values().collect();
    // Ties break on chunk id so output order is deterministic
    results.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    results
}

fn entry(scores: &mut HashMap<usize, RankedChunk>, chunk_id: usize) -> &mut RankedChunk {
    scores.entry(chunk_id).or_insert(RankedChunk {
        chunk_id,
        keyword_rank: None,
        vector_rank: None,
        rrf_score: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rrf_both_systems() {
        let keyword = vec![(1, 3.0), (2, 2.0), (3, 1.0)];
        let vector = vec![(2, 0.9), (1, 0.8), (4, 0.7)];

        let results = reciprocal_rank_fusion(&keyword, &vector);

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].chunk_id, 1);
        assert_eq!(results[1].chunk_id, 2);
        assert_eq!(results[0].keyword_rank, Some(1));
        assert_eq!(results[0].vector_rank, Some(2));
        assert!(results[0].rrf_score > results.last().unwrap().rrf_score);
    }

    #[test]
    fn test_rrf_keyword_only() {
        let results = reciprocal_rank_fusion(&[(7, 2.0), (3, 1.0)], &[]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, 7);
        assert_eq!(results[0].vector_rank, None);
    }

    #[test]
    fn test_rrf_empty() {
        assert!(reciprocal_rank_fusion(&[], &[]).is_empty());
    }
}
