//! Multihop fusion engine
//!
//! Issues one gateway pass per effective sub-query, tracks which passes
//! produced each chunk, and fuses scores so that cross-pass agreement
//! outranks any single pass. Passes are independent: they run concurrently
//! under a bounded pool, each with its own timeout, and a failed pass
//! degrades to an empty one instead of aborting the question.

use super::{agreement_boost, agreement_histogram, FusedChunk, FusedResultSet, RetrievalMetrics, RetrievalPass};
use crate::gateway::{RetrievalGateway, SearchFilter};
use crate::plan::{FusionStrategy, QueryPlan};
use docqa_common::config::{FusionConfig, GatewayConfig};
use docqa_common::errors::{AppError, Result};
use docqa_common::graph::Chunk;
use docqa_common::metrics;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Queries dispatched as passes: (text, used_hypothesis)
pub(crate) type PassQuery = (String, bool);

/// The central multi-pass retrieval engine
pub struct MultihopEngine {
    gateway: Arc<dyn RetrievalGateway>,
    fusion: FusionConfig,
    gateway_config: GatewayConfig,
}

impl MultihopEngine {
    pub fn new(
        gateway: Arc<dyn RetrievalGateway>,
        fusion: FusionConfig,
        gateway_config: GatewayConfig,
    ) -> Self {
        Self {
            gateway,
            fusion,
            gateway_config,
        }
    }

    /// Execute all passes for a plan and fuse the results.
    pub async fn retrieve(&self, plan: &QueryPlan, filter: &SearchFilter) -> Result<FusedResultSet> {
        let queries: Vec<PassQuery> = plan
            .effective_sub_queries()
            .into_iter()
            .map(|q| (q.to_string(), false))
            .collect();

        let top_k = match plan.fusion_strategy {
            // Broad enumeration questions get a deeper single pass
            FusionStrategy::Exhaustive => self.gateway_config.top_k * 2,
            _ => self.gateway_config.top_k,
        };

        let (passes, payloads) = self.execute_passes(&queries, filter, top_k).await;
        Ok(self.fuse(plan, &passes, &payloads))
    }

    /// Run gateway passes concurrently under the bounded pool.
    ///
    /// Each pass carries an independent timeout; a timed-out or failed pass
    /// is recorded as empty with a diagnostic. Dropping the returned future
    /// aborts all in-flight passes for this question only.
    pub async fn execute_passes(
        &self,
        queries: &[PassQuery],
        filter: &SearchFilter,
        top_k: usize,
    ) -> (Vec<RetrievalPass>, HashMap<Uuid, Chunk>) {
        let limit = self
            .gateway_config
            .max_concurrent_passes
            .max(1)
            .min(queries.len().max(1));
        let semaphore = Arc::new(Semaphore::new(limit));
        let timeout = std::time::Duration::from_millis(self.gateway_config.pass_timeout_ms);

        let mut join_set = JoinSet::new();
        for (pass_index, (query_text, used_hypothesis)) in queries.iter().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let filter = filter.clone();
            let query_text = query_text.clone();
            let used_hypothesis = *used_hypothesis;

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome =
                    tokio::time::timeout(timeout, gateway.search(&query_text, &filter, top_k)).await;

                match outcome {
                    Ok(Ok(hits)) => {
                        let results = hits.iter().map(|h| (h.chunk_id, h.score)).collect();
                        let payloads: Vec<Chunk> = hits.into_iter().map(|h| h.chunk).collect();
                        (
                            RetrievalPass {
                                query_text,
                                used_hypothesis,
                                pass_index,
                                results,
                                error: None,
                            },
                            payloads,
                        )
                    }
                    Ok(Err(e)) => {
                        warn!(pass = pass_index, error = %e, "Gateway pass failed, recording as empty");
                        (
                            RetrievalPass::failed(&query_text, used_hypothesis, pass_index, &e),
                            Vec::new(),
                        )
                    }
                    Err(_) => {
                        let timed_out = AppError::GatewayTimeout {
                            timeout_ms: timeout.as_millis() as u64,
                        };
                        warn!(
                            pass = pass_index,
                            timeout_ms = timeout.as_millis() as u64,
                            "Gateway pass timed out, recording as empty"
                        );
                        (
                            RetrievalPass::failed(&query_text, used_hypothesis, pass_index, &timed_out),
                            Vec::new(),
                        )
                    }
                }
            });
        }

        let mut passes: Vec<RetrievalPass> = Vec::with_capacity(queries.len());
        let mut payloads = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((pass, chunks)) => {
                    metrics::record_pass(pass.used_hypothesis, pass.error.is_some());
                    for chunk in chunks {
                        payloads.entry(chunk.id).or_insert(chunk);
                    }
                    passes.push(pass);
                }
                Err(e) => {
                    // A panicked pass is a defect, but the question still completes
                    warn!(error = %e, "Retrieval pass task failed to join");
                }
            }
        }

        // Provenance bookkeeping is commutative; restore plan order for
        // stable diagnostics only
        passes.sort_by_key(|p| p.pass_index);
        (passes, payloads)
    }

    /// Fuse pass results into a ranked, deduplicated, provenance-tracked set.
    ///
    /// Pure with respect to pass ordering: any permutation of `passes`
    /// yields the identical output.
    pub fn fuse(
        &self,
        plan: &QueryPlan,
        passes: &[RetrievalPass],
        payloads: &HashMap<Uuid, Chunk>,
    ) -> FusedResultSet {
        // Provenance: pass indices and best raw score per chunk
        let mut provenance: BTreeMap<Uuid, (BTreeSet<usize>, f32)> = BTreeMap::new();
        for pass in passes {
            for (chunk_id, score) in &pass.results {
                let entry = provenance
                    .entry(*chunk_id)
                    .or_insert_with(|| (BTreeSet::new(), f32::MIN));
                entry.0.insert(pass.pass_index);
                entry.1 = entry.1.max(*score);
            }
        }

        let mut fused: Vec<FusedChunk> = provenance
            .into_iter()
            .filter_map(|(chunk_id, (sources, best_raw))| {
                let chunk = payloads.get(&chunk_id)?.clone();
                let fused_score = best_raw * agreement_boost(&self.fusion, sources.len());
                Some(FusedChunk {
                    chunk,
                    fused_score,
                    source_passes: sources.into_iter().collect(),
                    from_expansion: false,
                    expansion_offset: 0,
                })
            })
            .collect();

        fused.sort_by(|a, b| Self::rank_cmp(plan.fusion_strategy, a, b));

        let fused = match plan.fusion_strategy {
            FusionStrategy::MultihopComparison => {
                Self::balance_comparison(fused, passes.len(), self.fusion.chunk_budget)
            }
            _ => {
                let mut fused = fused;
                fused.truncate(self.fusion.chunk_budget);
                fused
            }
        };

        let exhausted = passes.iter().all(|p| p.results.is_empty());
        let failed_passes = passes.iter().filter(|p| p.error.is_some()).count();

        let metrics = RetrievalMetrics {
            pass_count: passes.len(),
            failed_passes,
            total_chunks: fused.len(),
            agreement_histogram: agreement_histogram(&fused),
            hyde_used: passes.iter().any(|p| p.used_hypothesis),
            multihop_used: plan.requires_multihop,
            hyde_reverted: false,
        };

        if exhausted {
            info!(passes = passes.len(), "All retrieval passes empty, result exhausted");
        } else {
            debug!(
                passes = passes.len(),
                chunks = fused.len(),
                strategy = ?plan.fusion_strategy,
                "fusion complete"
            );
        }

        FusedResultSet {
            chunks: fused,
            plan: plan.clone(),
            exhausted,
            metrics,
        }
    }

    /// Descending fused score; under the conditional strategy, score ties go
    /// to the chunk first seen by an earlier (condition) pass; chunk id last
    /// for determinism.
    fn rank_cmp(strategy: FusionStrategy, a: &FusedChunk, b: &FusedChunk) -> Ordering {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                if strategy == FusionStrategy::MultihopConditional {
                    let a_first = a.source_passes.first().copied().unwrap_or(usize::MAX);
                    let b_first = b.source_passes.first().copied().unwrap_or(usize::MAX);
                    a_first.cmp(&b_first)
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    }

    /// Even top-k allocation between chunks traced to the first half
    /// ("left side") and second half ("right side") of the sub-queries, so
    /// neither side of a comparison is starved. Leftover budget is filled
    /// with the best remaining chunks.
    fn balance_comparison(
        sorted: Vec<FusedChunk>,
        pass_count: usize,
        budget: usize,
    ) -> Vec<FusedChunk> {
        if sorted.len() <= budget || pass_count < 2 {
            let mut sorted = sorted;
            sorted.truncate(budget);
            return sorted;
        }

        let mid = pass_count / 2;
        let mut left_quota = budget / 2;
        let mut right_quota = budget - budget / 2;
        let mut selected: HashSet<Uuid> = HashSet::new();

        for chunk in &sorted {
            if selected.len() >= budget {
                break;
            }
            let on_left = chunk.source_passes.iter().any(|&p| p < mid);
            let on_right = chunk.source_passes.iter().any(|&p| p >= mid);

            let take_left = on_left && left_quota > 0;
            let take_right = on_right && right_quota > 0;

            if take_left && (!take_right || left_quota >= right_quota) {
                left_quota -= 1;
                selected.insert(chunk.chunk.id);
            } else if take_right {
                right_quota -= 1;
                selected.insert(chunk.chunk.id);
            }
        }

        // Fill any unused quota with the best remaining chunks
        for chunk in &sorted {
            if selected.len() >= budget {
                break;
            }
            selected.insert(chunk.chunk.id);
        }

        sorted
            .into_iter()
            .filter(|c| selected.contains(&c.chunk.id))
            .collect()
    }
}
