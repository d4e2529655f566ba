//! Multi-pass result fusion
//!
//! Two fusion paths share these types:
//! - [`MultihopEngine`] fuses one pass per sub-query with an agreement
//!   boost: chunks corroborated by several reasoning steps outrank any
//!   single pass's score
//! - [`HydeFusion`] fuses the hypothesis/original pass pair with weighted
//!   reciprocal rank fusion and a revert guardrail

mod multihop;
mod rrf;

pub use multihop::MultihopEngine;
pub use rrf::{HybridOutcome, HydeFusion};

use crate::plan::QueryPlan;
use docqa_common::config::FusionConfig;
use docqa_common::errors::AppError;
use docqa_common::graph::Chunk;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One execution of the retrieval gateway for one (sub-)query
#[derive(Debug, Clone)]
pub struct RetrievalPass {
    /// The text actually searched
    pub query_text: String,

    /// Whether the text was a hypothesis document rather than the raw query
    pub used_hypothesis: bool,

    /// Position of this pass within the question's pass list
    pub pass_index: usize,

    /// Ranked (chunk id, raw score) results; empty for failed passes
    pub results: Vec<(Uuid, f32)>,

    /// Failure diagnostic when the pass was recorded as empty
    pub error: Option<String>,
}

impl RetrievalPass {
    /// An empty pass recording a failure or timeout
    pub fn failed(
        query_text: &str,
        used_hypothesis: bool,
        pass_index: usize,
        error: &AppError,
    ) -> Self {
        Self {
            query_text: query_text.to_string(),
            used_hypothesis,
            pass_index,
            results: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// A chunk annotated with its fused relevance and provenance
#[derive(Debug, Clone)]
pub struct FusedChunk {
    pub chunk: Chunk,

    /// Combined relevance after boosting or rank fusion
    pub fused_score: f32,

    /// Pass indices whose results contained this chunk, ascending
    pub source_passes: Vec<usize>,

    /// Whether the chunk was added by context expansion rather than
    /// retrieval. This flag alone discriminates expansion chunks.
    pub from_expansion: bool,

    /// Signed horizontal distance from the seed for sibling and
    /// reading-order neighbours; 0 for retrieved chunks and for the parent
    /// hop, which is vertical
    pub expansion_offset: i32,
}

/// Aggregate observability for one question
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    /// Passes planned for the question
    pub pass_count: usize,

    /// Passes recorded as empty after failure or timeout
    pub failed_passes: usize,

    /// Fused chunks returned (before expansion)
    pub total_chunks: usize,

    /// (source-pass count, chunk count) pairs, ascending by source count
    pub agreement_histogram: Vec<(usize, usize)>,

    /// Whether a hypothesis document was used for retrieval
    pub hyde_used: bool,

    /// Whether the multihop path was taken
    pub multihop_used: bool,

    /// Whether the hybrid ranking was reverted to original-only results
    pub hyde_reverted: bool,
}

/// Ordered, deduplicated, provenance-tracked result of one question
#[derive(Debug, Clone)]
pub struct FusedResultSet {
    /// Chunks in descending fused-score order
    pub chunks: Vec<FusedChunk>,

    /// The plan that produced this set, for diagnostics and prompting
    pub plan: QueryPlan,

    /// True when every pass returned zero chunks: a legitimate "no relevant
    /// information" outcome, not an error
    pub exhausted: bool,

    /// Aggregate metrics for the question
    pub metrics: RetrievalMetrics,
}

impl FusedResultSet {
    /// Chunk ids in rank order
    pub fn chunk_ids(&self) -> Vec<Uuid> {
        self.chunks.iter().map(|c| c.chunk.id).collect()
    }

    /// Best fused score, if any chunks were returned
    pub fn top_score(&self) -> Option<f32> {
        self.chunks.first().map(|c| c.fused_score)
    }
}

/// Agreement boost for a chunk seen by `sources` distinct passes.
///
/// Strictly non-decreasing in the source count: corroboration never lowers
/// rank.
pub fn agreement_boost(config: &FusionConfig, sources: usize) -> f32 {
    match sources {
        0 | 1 => config.boost_single,
        2 => config.boost_double,
        _ => config.boost_many,
    }
}

/// Build the (source count, chunk count) histogram for a fused chunk list,
/// ignoring expansion-added chunks.
pub fn agreement_histogram(chunks: &[FusedChunk]) -> Vec<(usize, usize)> {
    let mut counts = std::collections::BTreeMap::new();
    for chunk in chunks.iter().filter(|c| !c.from_expansion) {
        *counts.entry(chunk.source_passes.len()).or_insert(0usize) += 1;
    }
    counts.into_iter().collect()
}
