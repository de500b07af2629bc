//! Weighted-score fusion of vector and keyword results
//!
//! Each branch's scores are max-normalized to [0, 1], then combined as
//! `w * vector + (1 - w) * keyword`. A chunk seen by only one branch
//! keeps that branch's weighted term alone; being single-branch is
//! neither boosted nor penalized beyond the weight itself.

use std::collections::HashMap;
use uuid::Uuid;
use veridoc_common::index::IndexHit;

/// Fused score for one chunk
#[derive(Debug, Clone)]
pub struct FusedScore {
    pub chunk_id: Uuid,
    pub vector_score: Option<f32>,
    pub keyword_score: Option<f32>,
    pub fused_score: f32,
}

/// Divide by the branch maximum; scores at or below zero pass through
fn max_normalize(hits: &[IndexHit]) -> Vec<(Uuid, f32)> {
    let max = hits.iter().map(|h| h.score).fold(0.0f32, f32::max);
    hits.iter()
        .map(|h| {
            let normalized = if max > 0.0 { h.score / max } else { h.score };
            (h.chunk_id, normalized)
        })
        .collect()
}

/// Fuse both branches into one ordered candidate set.
///
/// Ordering is descending by fused score; ties keep insertion order
/// (vector-branch order first, then keyword-only hits in keyword order).
pub fn fuse_scores(
    vector_hits: &[IndexHit],
    keyword_hits: &[IndexHit],
    fusion_weight: f32,
    limit: usize,
) -> Vec<FusedScore> {
    let vector = max_normalize(vector_hits);
    let keyword = max_normalize(keyword_hits);

    let mut fused: Vec<FusedScore> = Vec::with_capacity(vector.len() + keyword.len());
    let mut positions: HashMap<Uuid, usize> = HashMap::new();

    for (chunk_id, score) in vector {
        positions.insert(chunk_id, fused.len());
        fused.push(FusedScore {
            chunk_id,
            vector_score: Some(score),
            keyword_score: None,
            fused_score: 0.0,
        });
    }

    for (chunk_id, score) in keyword {
        match positions.get(&chunk_id) {
            Some(&idx) => fused[idx].keyword_score = Some(score),
            None => {
                positions.insert(chunk_id, fused.len());
                fused.push(FusedScore {
                    chunk_id,
                    vector_score: None,
                    keyword_score: Some(score),
                    fused_score: 0.0,
                });
            }
        }
    }

    for entry in &mut fused {
        let vector_term = entry.vector_score.map(|s| fusion_weight * s).unwrap_or(0.0);
        let keyword_term = entry
            .keyword_score
            .map(|s| (1.0 - fusion_weight) * s)
            .unwrap_or(0.0);
        entry.fused_score = vector_term + keyword_term;
    }

    // Stable sort keeps insertion order on ties
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: u128, score: f32) -> IndexHit {
        IndexHit {
            chunk_id: Uuid::from_u128(id),
            score,
        }
    }

    #[test]
    fn test_both_branch_chunk_outranks_single_branch() {
        // A in both branches at full strength; B vector-only; C keyword-only
        let vector = vec![hit(1, 0.9), hit(2, 0.9)];
        let keyword = vec![hit(1, 12.0), hit(3, 12.0)];

        let fused = fuse_scores(&vector, &keyword, 0.5, 10);

        assert_eq!(fused[0].chunk_id, Uuid::from_u128(1));
        assert!((fused[0].fused_score - 1.0).abs() < 1e-6);
        // Single-branch chunks carry only their weighted term
        assert!((fused[1].fused_score - 0.5).abs() < 1e-6);
        assert!((fused[2].fused_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fusion_completeness() {
        // X only in vector, Y only in keyword: both must survive fusion
        let vector = vec![hit(10, 0.8)];
        let keyword = vec![hit(20, 5.0)];

        let fused = fuse_scores(&vector, &keyword, 0.6, 10);

        let ids: Vec<Uuid> = fused.iter().map(|f| f.chunk_id).collect();
        assert!(ids.contains(&Uuid::from_u128(10)));
        assert!(ids.contains(&Uuid::from_u128(20)));
    }

    #[test]
    fn test_weight_shifts_single_branch_ranking() {
        let vector = vec![hit(1, 1.0)];
        let keyword = vec![hit(2, 1.0)];

        // Vector-heavy weight favors the vector-only chunk
        let fused = fuse_scores(&vector, &keyword, 0.8, 10);
        assert_eq!(fused[0].chunk_id, Uuid::from_u128(1));

        // Keyword-heavy weight flips the order
        let fused = fuse_scores(&vector, &keyword, 0.2, 10);
        assert_eq!(fused[0].chunk_id, Uuid::from_u128(2));
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        // Same weighted score everywhere: vector branch order wins,
        // keyword-only hits follow in keyword order
        let vector = vec![hit(1, 0.7), hit(2, 0.7)];
        let keyword = vec![hit(3, 3.0), hit(4, 3.0)];

        let fused = fuse_scores(&vector, &keyword, 0.5, 10);
        let ids: Vec<u128> = fused.iter().map(|f| f.chunk_id.as_u128()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_normalization_uses_branch_maximum() {
        let vector = vec![hit(1, 0.5), hit(2, 0.25)];
        let fused = fuse_scores(&vector, &[], 1.0, 10);

        assert!((fused[0].vector_score.unwrap() - 1.0).abs() < 1e-6);
        assert!((fused[1].vector_score.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_truncation() {
        let vector = vec![hit(1, 0.9), hit(2, 0.8), hit(3, 0.7)];
        let fused = fuse_scores(&vector, &[], 1.0, 2);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].chunk_id, Uuid::from_u128(1));
    }

    #[test]
    fn test_empty_branches() {
        assert!(fuse_scores(&[], &[], 0.5, 10).is_empty());
    }
}
