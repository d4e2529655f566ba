//! Retrieval gateway contract
//!
//! The gateway is the single external search capability this core consumes:
//! embedding, nearest-neighbor lookup, optional keyword search, and
//! reranking all live behind it. Scores must be comparable within one
//! deployment so fusion thresholds stay meaningful.

use async_trait::async_trait;
use docqa_common::errors::Result;
use docqa_common::graph::{Chunk, ChunkGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Metadata filter applied to every gateway call.
///
/// `area` is mandatory: cross-area retrieval is never permitted inside one
/// question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Knowledge-domain partition, exact match
    pub area: String,

    /// Optional restriction to specific documents
    pub document_ids: Option<Vec<Uuid>>,
}

impl SearchFilter {
    pub fn area(area: &str) -> Self {
        Self {
            area: area.to_string(),
            document_ids: None,
        }
    }

    pub fn with_documents(mut self, document_ids: Vec<Uuid>) -> Self {
        self.document_ids = Some(document_ids);
        self
    }

    /// Whether a chunk satisfies this filter
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if chunk.area != self.area {
            return false;
        }
        match &self.document_ids {
            Some(ids) => ids.contains(&chunk.document_id),
            None => true,
        }
    }
}

/// One ranked gateway hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: Uuid,

    /// Gateway's native relevance score
    pub score: f32,

    /// Chunk payload resolved by the gateway
    pub chunk: Chunk,
}

/// External search capability over the vector index
#[async_trait]
pub trait RetrievalGateway: Send + Sync {
    /// Return up to `top_k` chunks ranked by relevance to `query_text`,
    /// restricted to the filter's area and documents.
    async fn search(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Lexical-overlap gateway over an in-memory chunk graph.
///
/// Test and demo double: scores are the fraction of distinct query terms
/// present in the chunk text, which lands on the same 0..1 scale the fusion
/// guardrails expect.
pub struct InMemoryGateway {
    graph: Arc<ChunkGraph>,
}

impl InMemoryGateway {
    pub fn new(graph: Arc<ChunkGraph>) -> Self {
        Self { graph }
    }

    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(|w| w.to_lowercase())
            .collect()
    }

    fn score(query_terms: &HashSet<String>, chunk: &Chunk) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let chunk_terms = Self::terms(&chunk.text);
        let hits = query_terms.iter().filter(|t| chunk_terms.contains(*t)).count();
        hits as f32 / query_terms.len() as f32
    }
}

#[async_trait]
impl RetrievalGateway for InMemoryGateway {
    async fn search(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_terms = Self::terms(query_text);

        let mut hits: Vec<ScoredChunk> = self
            .graph
            .iter()
            .filter(|chunk| filter.matches(chunk))
            .filter_map(|chunk| {
                let score = Self::score(&query_terms, chunk);
                (score > 0.0).then(|| ScoredChunk {
                    chunk_id: chunk.id,
                    score,
                    chunk: chunk.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: u128, area: &str, text: &str) -> Chunk {
        Chunk {
            id: Uuid::from_u128(id),
            document_id: Uuid::from_u128(1),
            area: area.to_string(),
            text: text.to_string(),
            hierarchy_level: 1,
            hierarchy_path: vec!["doc".into(), format!("s{}", id)],
            parent_id: None,
            children_ids: vec![],
            sibling_order: 0,
            token_count: 10,
        }
    }

    #[tokio::test]
    async fn test_area_filter_is_hard() {
        let graph = Arc::new(ChunkGraph::new(vec![
            chunk(1, "compliance", "risk levels and applicable sanctions"),
            chunk(2, "engineering", "risk levels in structural design"),
        ]));
        let gateway = InMemoryGateway::new(graph);

        let hits = gateway
            .search("risk levels", &SearchFilter::area("compliance"), 10)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, Uuid::from_u128(1));
    }

    #[tokio::test]
    async fn test_document_filter() {
        let mut other_doc = chunk(2, "compliance", "risk levels elsewhere");
        other_doc.document_id = Uuid::from_u128(9);
        let graph = Arc::new(ChunkGraph::new(vec![
            chunk(1, "compliance", "risk levels and sanctions"),
            other_doc,
        ]));
        let gateway = InMemoryGateway::new(graph);

        let filter =
            SearchFilter::area("compliance").with_documents(vec![Uuid::from_u128(9)]);
        let hits = gateway.search("risk levels", &filter, 10).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.document_id, Uuid::from_u128(9));
    }

    #[tokio::test]
    async fn test_ranking_and_truncation() {
        let graph = Arc::new(ChunkGraph::new(vec![
            chunk(1, "a", "sanctions apply to severe violations"),
            chunk(2, "a", "sanctions"),
            chunk(3, "a", "unrelated text entirely"),
        ]));
        let gateway = InMemoryGateway::new(graph);

        let hits = gateway
            .search("sanctions severe violations", &SearchFilter::area("a"), 1)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, Uuid::from_u128(1));
    }
}
