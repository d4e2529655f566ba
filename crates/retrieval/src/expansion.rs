//! Structural context expansion
//!
//! After fusion, each retrieved chunk is enriched with its structural
//! neighbourhood: the parent heading, nearby siblings, and reading-order
//! neighbours. Expansion never crosses the hard hierarchy boundary, so a
//! chunk from one top-level section cannot pull in text from another.
//! Expansion chunks are tagged and carry no relevance score of their own;
//! they pad the answer context without polluting provenance.

use crate::fusion::FusedChunk;
use docqa_common::config::ExpansionConfig;
use docqa_common::graph::{Chunk, ChunkGraph};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Which neighbourhoods to pull in, and how far
#[derive(Debug, Clone)]
pub struct ExpansionOptions {
    pub include_parent: bool,
    pub include_siblings: bool,
    pub include_adjacent: bool,

    /// Siblings and adjacent chunks within this many positions of the seed
    pub window: usize,

    /// Hierarchy level whose path prefix expansion may never cross
    pub hard_boundary_level: u32,
}

impl ExpansionOptions {
    pub fn from_config(config: &ExpansionConfig) -> Self {
        Self {
            include_parent: true,
            include_siblings: true,
            include_adjacent: true,
            window: config.window,
            hard_boundary_level: config.hard_boundary_level,
        }
    }
}

/// Expands fused results with structural neighbours from the chunk graph
pub struct ContextExpander {
    graph: Arc<ChunkGraph>,
    options: ExpansionOptions,
}

impl ContextExpander {
    pub fn new(graph: Arc<ChunkGraph>, options: ExpansionOptions) -> Self {
        Self { graph, options }
    }

    /// Append the structural neighbourhood of every retrieved chunk.
    ///
    /// Seeds are visited in rank order and the added chunks keep a
    /// deterministic order (parent, then siblings, then adjacent, nearest
    /// first). Chunks already present are never duplicated, and nothing
    /// outside the seed's hard boundary is admitted.
    pub fn expand(&self, chunks: &mut Vec<FusedChunk>) {
        if self.options.window == 0
            && !self.options.include_parent
        {
            return;
        }

        let mut present: HashSet<Uuid> = chunks.iter().map(|c| c.chunk.id).collect();
        let seeds: Vec<Uuid> = chunks
            .iter()
            .filter(|c| !c.from_expansion)
            .map(|c| c.chunk.id)
            .collect();

        let mut added: Vec<FusedChunk> = Vec::new();
        for seed_id in &seeds {
            let Some(seed) = self.graph.get(seed_id) else {
                continue;
            };

            let mut candidates: Vec<(i32, &Chunk)> = Vec::new();
            if self.options.include_parent {
                if let Some(parent) = self.graph.parent_of(seed_id) {
                    // Vertical hop: offset stays 0, `from_expansion` marks it
                    candidates.push((0, parent));
                }
            }
            if self.options.include_siblings {
                candidates.extend(self.graph.siblings_within(seed_id, self.options.window));
            }
            if self.options.include_adjacent {
                candidates.extend(self.graph.adjacent_within(seed_id, self.options.window));
            }

            for (offset, candidate) in candidates {
                if present.contains(&candidate.id) {
                    continue;
                }
                if !self
                    .graph
                    .within_boundary(seed, candidate, self.options.hard_boundary_level)
                {
                    continue;
                }
                present.insert(candidate.id);
                added.push(FusedChunk {
                    chunk: candidate.clone(),
                    fused_score: 0.0,
                    source_passes: Vec::new(),
                    from_expansion: true,
                    expansion_offset: offset,
                });
            }
        }

        if !added.is_empty() {
            debug!(seeds = seeds.len(), added = added.len(), "context expansion");
            chunks.extend(added);
        }
    }
}
