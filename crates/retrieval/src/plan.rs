//! Query plan model
//!
//! Result of classifying and decomposing one user question. The plan is
//! advisory: a degraded plan still retrieves, it just retrieves less
//! precisely.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Detected shape of a question
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// "What is X?"
    Definition,
    /// Enumerations: objectives, requirements, lists of items
    List,
    /// Quantities, thresholds, amounts, deadlines
    Numerical,
    /// "How do I X?", step-by-step procedures
    Procedural,
    /// "X vs Y", differences between things
    Comparison,
    /// "If X, then what?"
    Conditional,
    /// Totals and summaries across sections
    Aggregation,
    /// "Why" questions requiring justification
    Reasoning,
    /// Anything else
    Generic,
}

/// Estimated effort class for a question
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

/// How retrieval passes for the plan are combined
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Single pass, direct ranking
    Standard,
    /// Single pass with a larger budget for broad enumeration questions
    Exhaustive,
    /// One pass per sub-query, agreement-boosted fusion
    MultihopSequential,
    /// Even budget between left-side and right-side sub-queries
    MultihopComparison,
    /// Earlier (condition) passes win score ties over later ones
    MultihopConditional,
}

impl FusionStrategy {
    /// Whether this strategy fuses more than one pass
    pub fn is_multihop(&self) -> bool {
        matches!(
            self,
            FusionStrategy::MultihopSequential
                | FusionStrategy::MultihopComparison
                | FusionStrategy::MultihopConditional
        )
    }

    /// Strategy consistent with a query type and multihop decision
    pub fn for_query(query_type: QueryType, multihop: bool) -> Self {
        if !multihop {
            return match query_type {
                QueryType::List | QueryType::Aggregation => FusionStrategy::Exhaustive,
                _ => FusionStrategy::Standard,
            };
        }
        match query_type {
            QueryType::Comparison => FusionStrategy::MultihopComparison,
            QueryType::Conditional => FusionStrategy::MultihopConditional,
            _ => FusionStrategy::MultihopSequential,
        }
    }
}

/// Optional restriction of a question to specific documents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentScope {
    pub document_ids: Vec<Uuid>,
}

/// Classified and decomposed question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    /// The question as asked
    pub original_query: String,

    /// Detected question shape
    pub query_type: QueryType,

    /// Estimated effort class
    pub complexity: Complexity,

    /// Whether the question needs multiple retrieval passes
    pub requires_multihop: bool,

    /// Ordered sub-queries; empty unless decomposition produced them
    pub sub_queries: Vec<String>,

    /// How passes for this plan are fused
    pub fusion_strategy: FusionStrategy,
}

impl QueryPlan {
    /// Build a consistent single-pass plan
    pub fn single_pass(query: &str, query_type: QueryType, complexity: Complexity) -> Self {
        Self {
            original_query: query.to_string(),
            query_type,
            complexity,
            requires_multihop: false,
            sub_queries: Vec::new(),
            fusion_strategy: FusionStrategy::for_query(query_type, false),
        }
    }

    /// Build a consistent multihop plan.
    ///
    /// `sub_queries` may be empty (heuristic fallback); callers then treat
    /// the original question as the sole sub-query.
    pub fn multihop(
        query: &str,
        query_type: QueryType,
        complexity: Complexity,
        sub_queries: Vec<String>,
    ) -> Self {
        Self {
            original_query: query.to_string(),
            query_type,
            complexity,
            requires_multihop: true,
            sub_queries,
            fusion_strategy: FusionStrategy::for_query(query_type, true),
        }
    }

    /// The queries actually dispatched to the gateway: the sub-queries when
    /// present, otherwise the original question alone.
    pub fn effective_sub_queries(&self) -> Vec<&str> {
        if self.requires_multihop && !self.sub_queries.is_empty() {
            self.sub_queries.iter().map(|s| s.as_str()).collect()
        } else {
            vec![self.original_query.as_str()]
        }
    }

    /// Check the plan's internal consistency: strategy matches the multihop
    /// decision, and a non-multihop plan carries no sub-queries.
    pub fn is_consistent(&self) -> bool {
        self.fusion_strategy.is_multihop() == self.requires_multihop
            && (self.requires_multihop || self.sub_queries.is_empty())
    }
}
