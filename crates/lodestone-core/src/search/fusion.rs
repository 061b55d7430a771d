//! Weighted dense + sparse score fusion

use crate::db::SearchHit;
use std::collections::HashMap;

/// One chunk after fusing the dense and sparse candidate lists
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub hit: SearchHit,
    /// Raw dense similarity, 0 when the chunk was not a dense candidate
    pub dense_score: f64,
    /// Raw sparse similarity, 0 when the chunk was not a sparse candidate
    pub sparse_score: f64,
    pub fused_score: f64,
    /// Position of first appearance across the dense then sparse lists
    pub order: usize,
}

/// Min-max normalize into `[0, 1]`. A list whose scores are all equal
/// normalizes to all ones.
pub fn normalize(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    scores
        .iter()
        .map(|s| if range > f64::EPSILON { (s - min) / range } else { 1.0 })
        .collect()
}

/// Union both lists by chunk id and score each candidate as
/// `dense_weight * dense + sparse_weight * sparse` over normalized scores.
/// A list a candidate is missing from contributes zero.
///
/// Output is ordered by fused score, then first appearance, then chunk id.
pub fn fuse(
    dense: Vec<SearchHit>,
    sparse: Vec<SearchHit>,
    dense_weight: f64,
    sparse_weight: f64,
) -> Vec<FusedCandidate> {
    let dense_norm = normalize(&dense.iter().map(|h| h.score).collect::<Vec<_>>());
    let sparse_norm = normalize(&sparse.iter().map(|h| h.score).collect::<Vec<_>>());

    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<FusedCandidate> = Vec::with_capacity(dense.len() + sparse.len());

    for (hit, norm) in dense.into_iter().zip(dense_norm) {
        if by_id.contains_key(&hit.chunk_id) {
            continue;
        }
        by_id.insert(hit.chunk_id.clone(), fused.len());
        fused.push(FusedCandidate {
            dense_score: hit.score,
            sparse_score: 0.0,
            fused_score: dense_weight * norm,
            order: fused.len(),
            hit,
        });
    }

    for (hit, norm) in sparse.into_iter().zip(sparse_norm) {
        match by_id.get(&hit.chunk_id) {
            Some(&i) => {
                let candidate = &mut fused[i];
                if candidate.sparse_score == 0.0 {
                    candidate.sparse_score = hit.score;
                    candidate.fused_score += sparse_weight * norm;
                }
            }
            None => {
                by_id.insert(hit.chunk_id.clone(), fused.len());
                fused.push(FusedCandidate {
                    dense_score: 0.0,
                    sparse_score: hit.score,
                    fused_score: sparse_weight * norm,
                    order: fused.len(),
                    hit,
                });
            }
        }
    }

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.order.cmp(&b.order))
            .then_with(|| a.hit.chunk_id.cmp(&b.hit.chunk_id))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scope;

    fn hit(id: &str, score: f64) -> SearchHit {
        SearchHit {
            chunk_id: id.to_string(),
            dataset_id: "ds".to_string(),
            scope: Scope::Local,
            path: format!("{}.md", id),
            locator: format!("{}.md#0", id),
            text: id.to_string(),
            language: None,
            symbol: None,
            score,
        }
    }

    fn ids(fused: &[FusedCandidate]) -> Vec<&str> {
        fused.iter().map(|c| c.hit.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(normalize(&[0.7, 0.7]), vec![1.0, 1.0]);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_missing_list_contributes_zero() {
        let fused = fuse(
            vec![hit("a", 0.9), hit("b", 0.5)],
            vec![hit("b", 3.0), hit("c", 1.0)],
            0.5,
            0.5,
        );
        // a: 0.5*1 + 0, b: 0.5*0 + 0.5*1, c: 0 + 0.5*0
        assert_eq!(ids(&fused), vec!["a", "b", "c"]);
        let b = fused.iter().find(|c| c.hit.chunk_id == "b").unwrap();
        assert_eq!(b.dense_score, 0.5);
        assert_eq!(b.sparse_score, 3.0);
        let c = fused.iter().find(|c| c.hit.chunk_id == "c").unwrap();
        assert_eq!(c.dense_score, 0.0);
        assert_eq!(c.fused_score, 0.0);
    }

    #[test]
    fn test_weights_shift_ranking() {
        let dense = vec![hit("a", 0.9), hit("b", 0.1)];
        let sparse = vec![hit("b", 5.0), hit("a", 1.0)];
        assert_eq!(ids(&fuse(dense.clone(), sparse.clone(), 0.8, 0.2))[0], "a");
        assert_eq!(ids(&fuse(dense, sparse, 0.2, 0.8))[0], "b");
    }

    #[test]
    fn test_ties_break_by_order_then_id() {
        // Every candidate normalizes to 1.0 within its own list
        let fused = fuse(
            vec![hit("z", 0.4)],
            vec![hit("m", 2.0)],
            0.5,
            0.5,
        );
        assert_eq!(ids(&fused), vec!["z", "m"]);

        let fused = fuse(vec![hit("b", 1.0), hit("a", 1.0)], vec![], 1.0, 0.0);
        assert_eq!(ids(&fused), vec!["b", "a"]);
    }

    #[test]
    fn test_dense_only() {
        let fused = fuse(vec![hit("a", 0.2), hit("b", 0.8)], vec![], 0.5, 0.5);
        assert_eq!(ids(&fused), vec!["b", "a"]);
    }
}
