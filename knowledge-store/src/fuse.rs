//! Reciprocal Rank Fusion of vector and lexical result lists.

use std::collections::HashMap;

use crate::ScoredPoint;

/// Smoothing constant: higher values flatten the influence of rank
/// differences.
pub const RRF_K: f32 = 60.0;

/// Merge two ranked lists with Reciprocal Rank Fusion.
///
/// An item at 0-based rank `r` contributes `1 / (k + r + 1)` for each list it
/// appears in; contributions sum by id. The vector list is merged first, so
/// its payload (content, metadata) wins when both lists carry the same id and
/// ties in the summed score resolve in first-encounter order.
pub fn reciprocal_rank_fusion(
    vector: Vec<ScoredPoint>,
    lexical: Vec<ScoredPoint>,
    k: f32,
) -> Vec<ScoredPoint> {
    struct Fused {
        point: ScoredPoint,
        score: f32,
        first_seen: usize,
    }

    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<Fused> = Vec::new();

    for list in [vector, lexical] {
        for (rank, point) in list.into_iter().enumerate() {
            let contribution = 1.0 / (k + rank as f32 + 1.0);
            match by_id.get(&point.id) {
                Some(&slot) => fused[slot].score += contribution,
                None => {
                    by_id.insert(point.id.clone(), fused.len());
                    let first_seen = fused.len();
                    fused.push(Fused { point, score: contribution, first_seen });
                }
            }
        }
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first_seen.cmp(&b.first_seen))
    });

    fused
        .into_iter()
        .map(|f| ScoredPoint { score: f.score, ..f.point })
        .collect()
}
