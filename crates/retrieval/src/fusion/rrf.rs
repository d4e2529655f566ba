//! Hypothesis-augmented hybrid fusion
//!
//! Blends a hypothesis-driven pass with the original-query pass using
//! weighted reciprocal rank fusion, then applies guardrails on the raw
//! gateway scores: if the hypothesis pass retrieved nothing convincing, or
//! failed to meaningfully beat the original query alone, the hybrid ranking
//! is discarded and the original pass stands on its own.

use super::{FusedChunk, RetrievalPass};
use docqa_common::config::HydeConfig;
use docqa_common::graph::Chunk;
use docqa_common::metrics;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of one hybrid fusion, including whether the guardrails fired
#[derive(Debug, Clone)]
pub struct HybridOutcome {
    /// Chunks in descending fused-score order
    pub chunks: Vec<FusedChunk>,

    /// True when the hybrid ranking was discarded in favour of the
    /// original pass
    pub reverted: bool,
}

/// Weighted reciprocal-rank fusion of a hypothesis pass and the original
/// query pass.
pub struct HydeFusion {
    config: HydeConfig,
}

impl HydeFusion {
    pub fn new(config: HydeConfig) -> Self {
        Self { config }
    }

    /// Fuse the two passes, applying the revert guardrails.
    ///
    /// `hypothesis_pass` must carry pass index 0 and `original_pass` index 1;
    /// provenance in the output refers to those indices.
    pub fn fuse(
        &self,
        hypothesis_pass: &RetrievalPass,
        original_pass: &RetrievalPass,
        payloads: &HashMap<Uuid, Chunk>,
        budget: usize,
    ) -> HybridOutcome {
        let hyp_best = best_raw(hypothesis_pass);
        let orig_best = best_raw(original_pass);

        let floor_met = hyp_best >= self.config.score_floor;
        let improved = hyp_best > orig_best * (1.0 + self.config.min_improvement);

        if hypothesis_pass.results.is_empty() || !floor_met || !improved {
            info!(
                hypothesis_best = hyp_best,
                original_best = orig_best,
                floor = self.config.score_floor,
                "Hypothesis pass below guardrails, reverting to original query"
            );
            metrics::record_hypothesis_revert();
            let mut chunks = original_only(original_pass, payloads);
            chunks.truncate(budget);
            return HybridOutcome {
                chunks,
                reverted: true,
            };
        }

        // rank -> reciprocal contribution, weighted per side; a chunk absent
        // from a side contributes zero from it
        let mut scores: HashMap<Uuid, (f32, Vec<usize>, f32)> = HashMap::new();
        for (rank, (chunk_id, raw)) in hypothesis_pass.results.iter().enumerate() {
            let contribution =
                self.config.hypothesis_weight / (self.config.rrf_k + (rank + 1) as f32);
            let entry = scores.entry(*chunk_id).or_insert((0.0, Vec::new(), f32::MIN));
            entry.0 += contribution;
            entry.1.push(hypothesis_pass.pass_index);
            entry.2 = entry.2.max(*raw);
        }
        for (rank, (chunk_id, raw)) in original_pass.results.iter().enumerate() {
            let contribution =
                self.config.original_weight / (self.config.rrf_k + (rank + 1) as f32);
            let entry = scores.entry(*chunk_id).or_insert((0.0, Vec::new(), f32::MIN));
            entry.0 += contribution;
            entry.1.push(original_pass.pass_index);
            entry.2 = entry.2.max(*raw);
        }

        let mut chunks: Vec<FusedChunk> = scores
            .into_iter()
            .filter_map(|(chunk_id, (rrf_score, mut sources, _))| {
                let chunk = payloads.get(&chunk_id)?.clone();
                sources.sort_unstable();
                Some(FusedChunk {
                    chunk,
                    fused_score: rrf_score,
                    source_passes: sources,
                    from_expansion: false,
                    expansion_offset: 0,
                })
            })
            .collect();

        chunks.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        chunks.truncate(budget);

        debug!(
            chunks = chunks.len(),
            hypothesis_best = hyp_best,
            "hybrid fusion kept hypothesis ranking"
        );
        HybridOutcome {
            chunks,
            reverted: false,
        }
    }
}

fn best_raw(pass: &RetrievalPass) -> f32 {
    pass.results
        .iter()
        .map(|(_, score)| *score)
        .fold(0.0, f32::max)
}

fn original_only(pass: &RetrievalPass, payloads: &HashMap<Uuid, Chunk>) -> Vec<FusedChunk> {
    pass.results
        .iter()
        .filter_map(|(chunk_id, score)| {
            let chunk = payloads.get(chunk_id)?.clone();
            Some(FusedChunk {
                chunk,
                fused_score: *score,
                source_passes: vec![pass.pass_index],
                from_expansion: false,
                expansion_offset: 0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HydeConfig {
        HydeConfig {
            enabled: true,
            default_max_tokens: 150,
            score_floor: 0.30,
            min_improvement: 0.20,
            hypothesis_weight: 0.7,
            original_weight: 0.3,
            rrf_k: 60.0,
        }
    }

    fn chunk(id: u128) -> Chunk {
        Chunk {
            id: Uuid::from_u128(id),
            document_id: Uuid::from_u128(1),
            area: "a".into(),
            text: format!("chunk {}", id),
            hierarchy_level: 1,
            hierarchy_path: vec!["doc".into()],
            parent_id: None,
            children_ids: vec![],
            sibling_order: 0,
            token_count: 5,
        }
    }

    fn pass(index: usize, results: &[(u128, f32)]) -> RetrievalPass {
        RetrievalPass {
            query_text: format!("q{}", index),
            used_hypothesis: index == 0,
            pass_index: index,
            results: results.iter().map(|(id, s)| (Uuid::from_u128(*id), *s)).collect(),
            error: None,
        }
    }

    fn payloads(ids: &[u128]) -> HashMap<Uuid, Chunk> {
        ids.iter().map(|id| (Uuid::from_u128(*id), chunk(*id))).collect()
    }

    #[test]
    fn test_rrf_weights_by_side() {
        let fusion = HydeFusion::new(config());
        // Hypothesis clearly improves: 0.9 > 0.5 * 1.2
        let hyp = pass(0, &[(1, 0.9), (2, 0.6)]);
        let orig = pass(1, &[(2, 0.5), (3, 0.4)]);
        let outcome = fusion.fuse(&hyp, &orig, &payloads(&[1, 2, 3]), 50);

        assert!(!outcome.reverted);
        let by_id = |id: u128| {
            outcome
                .chunks
                .iter()
                .find(|c| c.chunk.id == Uuid::from_u128(id))
                .unwrap()
        };

        // Chunk 1: hypothesis rank 1 only
        assert!((by_id(1).fused_score - 0.7 / 61.0).abs() < 1e-6);
        // Chunk 2: hypothesis rank 2 plus original rank 1
        assert!((by_id(2).fused_score - (0.7 / 62.0 + 0.3 / 61.0)).abs() < 1e-6);
        assert_eq!(by_id(2).source_passes, vec![0, 1]);
        // Chunk 3: original rank 2 only
        assert!((by_id(3).fused_score - 0.3 / 62.0).abs() < 1e-6);

        // Chunk appearing in both lists wins
        assert_eq!(outcome.chunks[0].chunk.id, Uuid::from_u128(2));
    }

    #[test]
    fn test_revert_below_score_floor() {
        let fusion = HydeFusion::new(config());
        let hyp = pass(0, &[(1, 0.25), (2, 0.10)]);
        let orig = pass(1, &[(3, 0.20)]);
        let outcome = fusion.fuse(&hyp, &orig, &payloads(&[1, 2, 3]), 50);

        assert!(outcome.reverted);
        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.chunks[0].chunk.id, Uuid::from_u128(3));
        assert_eq!(outcome.chunks[0].source_passes, vec![1]);
    }

    #[test]
    fn test_revert_without_improvement() {
        let fusion = HydeFusion::new(config());
        // 0.55 is above the floor but not > 0.5 * 1.2
        let hyp = pass(0, &[(1, 0.55)]);
        let orig = pass(1, &[(2, 0.50), (3, 0.45)]);
        let outcome = fusion.fuse(&hyp, &orig, &payloads(&[1, 2, 3]), 50);

        assert!(outcome.reverted);
        assert_eq!(
            outcome.chunks.iter().map(|c| c.chunk.id).collect::<Vec<_>>(),
            vec![Uuid::from_u128(2), Uuid::from_u128(3)]
        );
    }

    #[test]
    fn test_revert_on_empty_hypothesis_pass() {
        let fusion = HydeFusion::new(config());
        let hyp = pass(0, &[]);
        let orig = pass(1, &[(2, 0.8)]);
        let outcome = fusion.fuse(&hyp, &orig, &payloads(&[2]), 50);

        assert!(outcome.reverted);
        assert_eq!(outcome.chunks.len(), 1);
    }

    #[test]
    fn test_budget_applies_to_both_paths() {
        let fusion = HydeFusion::new(config());
        let hyp = pass(0, &[(1, 0.9), (2, 0.8), (3, 0.7)]);
        let orig = pass(1, &[(4, 0.3), (5, 0.2)]);
        let outcome = fusion.fuse(&hyp, &orig, &payloads(&[1, 2, 3, 4, 5]), 2);
        assert_eq!(outcome.chunks.len(), 2);

        let low = pass(0, &[(1, 0.1)]);
        let orig = pass(1, &[(4, 0.3), (5, 0.2), (6, 0.1)]);
        let outcome = fusion.fuse(&low, &orig, &payloads(&[1, 4, 5, 6]), 2);
        assert!(outcome.reverted);
        assert_eq!(outcome.chunks.len(), 2);
    }
}
