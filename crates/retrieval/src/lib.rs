//! DocQA Retrieval Core
//!
//! Retrieval orchestration for question answering over hierarchically
//! structured documents:
//! - Query classification & decomposition (model-backed with a
//!   deterministic heuristic fallback)
//! - Hypothesis-document (HyDE) retrieval with a revert guardrail
//! - Multihop fusion with provenance-based agreement boosting
//! - Structural context expansion honoring hierarchy boundaries
//!
//! The core consumes two external capabilities: a [`gateway::RetrievalGateway`]
//! over the vector index and a [`docqa_common::llm::LanguageModel`] completion
//! service. It owns no persisted state; everything is scoped to one question.

pub mod classifier;
pub mod expansion;
pub mod fusion;
pub mod gateway;
pub mod hyde;
pub mod pipeline;
pub mod plan;

pub use classifier::{HeuristicClassifier, ModelClassifier, QueryClassifier};
pub use expansion::{ContextExpander, ExpansionOptions};
pub use fusion::{
    FusedChunk, FusedResultSet, HybridOutcome, HydeFusion, MultihopEngine, RetrievalMetrics,
    RetrievalPass,
};
pub use gateway::{InMemoryGateway, RetrievalGateway, ScoredChunk, SearchFilter};
pub use hyde::{Hypothesis, HypothesisGenerator};
pub use pipeline::RetrievalPipeline;
pub use plan::{Complexity, DocumentScope, FusionStrategy, QueryPlan, QueryType};
