//! Chunk graph model
//!
//! In-memory representation of hierarchically chunked documents:
//! - Chunks are immutable units of retrievable text with hierarchy metadata
//! - Parent/child/sibling relations are stored as id references and resolved
//!   through an arena, never as direct object cycles
//! - The graph is read-only after construction and can be shared across
//!   concurrent questions without locking

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Immutable unit of retrievable text with hierarchy metadata.
///
/// Embeddings belong to the vector index, not to this model. Chunks are
/// created once during ingestion and never mutated by the retrieval core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk ID
    pub id: Uuid,

    /// Document this chunk belongs to
    pub document_id: Uuid,

    /// Knowledge-domain tag; retrieval never crosses areas within one query
    pub area: String,

    /// Chunk text content
    pub text: String,

    /// Depth in the document hierarchy (0 = document root)
    pub hierarchy_level: u32,

    /// Ordered labels of ancestor sections, root first
    pub hierarchy_path: Vec<String>,

    /// Parent chunk (id reference, resolved through the arena)
    pub parent_id: Option<Uuid>,

    /// Ordered child chunk ids
    pub children_ids: Vec<Uuid>,

    /// Position among same-parent chunks
    pub sibling_order: u32,

    /// Token count for context budgeting
    pub token_count: usize,
}

impl Chunk {
    /// Prefix of the hierarchy path through the given level.
    ///
    /// `hierarchy_path[0]` is the document root label, `hierarchy_path[1]`
    /// the top-level section, and so on. Two chunks lie in the same
    /// structural region at `level` iff these prefixes are equal.
    pub fn path_prefix(&self, level: u32) -> &[String] {
        let end = (level as usize + 1).min(self.hierarchy_path.len());
        &self.hierarchy_path[..end]
    }
}

/// Arena of chunks indexed by id, with per-document reading order.
///
/// Construction consumes ingestion output; chunk relations are weak id
/// references resolved through `get`.
#[derive(Debug, Default)]
pub struct ChunkGraph {
    chunks: HashMap<Uuid, Chunk>,

    /// Chunk ids per document, in reading order
    document_order: HashMap<Uuid, Vec<Uuid>>,

    /// Position of each chunk within its document's reading order
    order_index: HashMap<Uuid, usize>,
}

impl ChunkGraph {
    /// Build a graph from chunks listed in per-document reading order.
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let mut graph = Self::default();
        for chunk in chunks {
            let order = graph.document_order.entry(chunk.document_id).or_default();
            graph.order_index.insert(chunk.id, order.len());
            order.push(chunk.id);
            graph.chunks.insert(chunk.id, chunk);
        }
        graph
    }

    /// Number of chunks in the arena
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the arena is empty
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Look up a chunk by id
    pub fn get(&self, id: &Uuid) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// Resolve a chunk's parent, if any
    pub fn parent_of(&self, id: &Uuid) -> Option<&Chunk> {
        let chunk = self.get(id)?;
        let parent_id = chunk.parent_id.as_ref()?;
        self.get(parent_id)
    }

    /// Siblings of a chunk under the same parent, within `window` positions
    /// on either side of its `sibling_order`. The chunk itself is excluded.
    ///
    /// Results are (signed sibling distance, chunk) pairs in order.
    pub fn siblings_within(&self, id: &Uuid, window: usize) -> Vec<(i32, &Chunk)> {
        let Some(chunk) = self.get(id) else {
            return Vec::new();
        };
        let Some(parent) = chunk.parent_id.and_then(|pid| self.get(&pid)) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for child_id in &parent.children_ids {
            if child_id == id {
                continue;
            }
            if let Some(sibling) = self.get(child_id) {
                let offset = sibling.sibling_order as i64 - chunk.sibling_order as i64;
                if offset.unsigned_abs() as usize <= window {
                    out.push((offset as i32, sibling));
                }
            }
        }
        out.sort_by_key(|(offset, _)| *offset);
        out
    }

    /// Chunks within `window` positions of the given chunk in document
    /// reading order, on either side. The chunk itself is excluded.
    ///
    /// Results are (signed reading-order distance, chunk) pairs in order.
    pub fn adjacent_within(&self, id: &Uuid, window: usize) -> Vec<(i32, &Chunk)> {
        let Some(chunk) = self.get(id) else {
            return Vec::new();
        };
        let Some(order) = self.document_order.get(&chunk.document_id) else {
            return Vec::new();
        };
        let Some(&pos) = self.order_index.get(id) else {
            return Vec::new();
        };

        let start = pos.saturating_sub(window);
        let end = (pos + window).min(order.len().saturating_sub(1));

        let mut out = Vec::new();
        for (i, neighbor_id) in order[start..=end].iter().enumerate() {
            let neighbor_pos = start + i;
            if neighbor_pos == pos {
                continue;
            }
            if let Some(neighbor) = self.get(neighbor_id) {
                out.push((neighbor_pos as i32 - pos as i32, neighbor));
            }
        }
        out
    }

    /// Whether `candidate` lies inside the same hard structural region as
    /// `seed`: same document, same area, and identical hierarchy-path prefix
    /// up to `boundary_level`.
    pub fn within_boundary(&self, seed: &Chunk, candidate: &Chunk, boundary_level: u32) -> bool {
        seed.document_id == candidate.document_id
            && seed.area == candidate.area
            && seed.path_prefix(boundary_level) == candidate.path_prefix(boundary_level)
    }

    /// Iterate over all chunks (arbitrary order)
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }
}
