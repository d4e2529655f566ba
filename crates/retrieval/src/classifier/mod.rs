//! Query classification & decomposition
//!
//! One capability, two interchangeable strategies:
//! - [`ModelClassifier`] asks the language-model service for a plan and
//!   fails open to the heuristic on any error or unparsable output
//! - [`HeuristicClassifier`] is deterministic keyword matching, usable
//!   standalone and as the fallback
//!
//! Classification is advisory and never blocks retrieval: `analyze` cannot
//! fail, it can only degrade.

mod heuristic;

pub use heuristic::HeuristicClassifier;

use crate::plan::{Complexity, DocumentScope, QueryPlan, QueryType};
use async_trait::async_trait;
use docqa_common::errors::{AppError, Result};
use docqa_common::llm::LanguageModel;
use docqa_common::metrics;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Capability: turn a question into a retrieval plan
#[async_trait]
pub trait QueryClassifier: Send + Sync {
    /// Analyze a question, optionally scoped to specific documents.
    ///
    /// Implementations must not surface transient failures; a degraded but
    /// valid plan is always returned.
    async fn analyze(&self, question: &str, scope: Option<&DocumentScope>) -> QueryPlan;
}

#[async_trait]
impl QueryClassifier for HeuristicClassifier {
    async fn analyze(&self, question: &str, _scope: Option<&DocumentScope>) -> QueryPlan {
        self.classify(question)
    }
}

/// JSON contract expected from the classification prompt
#[derive(Debug, Deserialize)]
struct PlanPayload {
    query_type: String,
    complexity: String,
    requires_multihop: bool,
    #[serde(default)]
    sub_queries: Vec<String>,
}

/// Model-backed classifier with heuristic fallback
pub struct ModelClassifier {
    model: Arc<dyn LanguageModel>,
    fallback: HeuristicClassifier,
    max_sub_queries: usize,
    max_tokens: usize,
}

impl ModelClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, max_sub_queries: usize, max_tokens: usize) -> Self {
        Self {
            model,
            fallback: HeuristicClassifier::new(),
            max_sub_queries,
            max_tokens,
        }
    }

    fn prompt(question: &str) -> String {
        format!(
            "Classify the question below for document retrieval and reply with \
             JSON only, no prose.\n\
             Fields:\n\
             - query_type: one of definition, list, numerical, procedural, \
             comparison, conditional, aggregation, reasoning, generic\n\
             - complexity: one of simple, medium, complex\n\
             - requires_multihop: true when answering needs multiple \
             independent retrieval steps\n\
             - sub_queries: when requires_multihop is true, 2-4 self-contained \
             search queries in the question's language, ordered; otherwise []\n\
             \n\
             Question: {question}"
        )
    }

    /// Parse and validate a model reply into a consistent plan.
    fn parse_plan(&self, question: &str, raw: &str) -> Result<QueryPlan> {
        // Models wrap JSON in code fences often enough to strip them here
        let trimmed = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let payload: PlanPayload =
            serde_json::from_str(trimmed).map_err(|e| AppError::UnparsablePlan {
                message: format!("{}: {:?}", e, truncate(trimmed, 120)),
            })?;

        let query_type = parse_query_type(&payload.query_type)?;
        let complexity = parse_complexity(&payload.complexity)?;

        let mut sub_queries: Vec<String> = payload
            .sub_queries
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        sub_queries.truncate(self.max_sub_queries);

        if !payload.requires_multihop && !sub_queries.is_empty() {
            return Err(AppError::UnparsablePlan {
                message: "sub_queries present on a single-hop plan".to_string(),
            });
        }

        let plan = if payload.requires_multihop {
            QueryPlan::multihop(question, query_type, complexity, sub_queries)
        } else {
            QueryPlan::single_pass(question, query_type, complexity)
        };
        debug_assert!(plan.is_consistent());
        Ok(plan)
    }
}

#[async_trait]
impl QueryClassifier for ModelClassifier {
    async fn analyze(&self, question: &str, scope: Option<&DocumentScope>) -> QueryPlan {
        let prompt = Self::prompt(question);

        let plan = match self.model.complete(&prompt, self.max_tokens).await {
            Ok(completion) => self.parse_plan(question, &completion.text),
            Err(e) => Err(AppError::Classification {
                message: e.to_string(),
            }),
        };

        match plan {
            Ok(plan) => {
                debug!(
                    query_type = ?plan.query_type,
                    multihop = plan.requires_multihop,
                    sub_queries = plan.sub_queries.len(),
                    "model classification"
                );
                plan
            }
            Err(e) => {
                // Fail open: classification is advisory, never blocking
                warn!(error = %e, "Model classification failed, using heuristics");
                metrics::record_classifier_fallback();
                self.fallback.analyze(question, scope).await
            }
        }
    }
}

fn parse_query_type(raw: &str) -> Result<QueryType> {
    match raw.trim().to_lowercase().as_str() {
        "definition" => Ok(QueryType::Definition),
        "list" => Ok(QueryType::List),
        "numerical" => Ok(QueryType::Numerical),
        "procedural" => Ok(QueryType::Procedural),
        "comparison" => Ok(QueryType::Comparison),
        "conditional" => Ok(QueryType::Conditional),
        "aggregation" => Ok(QueryType::Aggregation),
        "reasoning" => Ok(QueryType::Reasoning),
        "generic" => Ok(QueryType::Generic),
        other => Err(AppError::UnparsablePlan {
            message: format!("unknown query_type: {}", other),
        }),
    }
}

fn parse_complexity(raw: &str) -> Result<Complexity> {
    match raw.trim().to_lowercase().as_str() {
        "simple" => Ok(Complexity::Simple),
        "medium" => Ok(Complexity::Medium),
        "complex" => Ok(Complexity::Complex),
        other => Err(AppError::UnparsablePlan {
            message: format!("unknown complexity: {}", other),
        }),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::FusionStrategy;
    use docqa_common::llm::MockLanguageModel;

    #[tokio::test]
    async fn test_model_plan_parsed() {
        let model = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"query_type": "comparison", "complexity": "complex",
                "requires_multihop": true,
                "sub_queries": ["risk levels", "applicable sanctions"]}"#,
        ]));
        let classifier = ModelClassifier::new(model, 4, 300);

        let plan = classifier.analyze("niveles de riesgo vs sanciones", None).await;
        assert_eq!(plan.query_type, QueryType::Comparison);
        assert_eq!(plan.fusion_strategy, FusionStrategy::MultihopComparison);
        assert_eq!(plan.sub_queries.len(), 2);
    }

    #[tokio::test]
    async fn test_fenced_json_accepted() {
        let model = Arc::new(MockLanguageModel::with_responses(vec![
            "```json\n{\"query_type\": \"definition\", \"complexity\": \"simple\", \"requires_multihop\": false}\n```",
        ]));
        let classifier = ModelClassifier::new(model, 4, 300);

        let plan = classifier.analyze("qué es un incidente?", None).await;
        assert_eq!(plan.query_type, QueryType::Definition);
        assert!(!plan.requires_multihop);
    }

    #[tokio::test]
    async fn test_service_error_falls_back_to_heuristics() {
        let model = Arc::new(MockLanguageModel::failing());
        let classifier = ModelClassifier::new(model, 4, 300);

        let plan = classifier
            .analyze("Cuáles son los niveles de riesgo y qué sanciones aplican?", None)
            .await;
        // Heuristic fallback still decomposes the compound question
        assert!(plan.requires_multihop);
        assert_eq!(plan.sub_queries.len(), 2);
    }

    #[tokio::test]
    async fn test_garbage_output_falls_back() {
        let model = Arc::new(MockLanguageModel::with_responses(vec![
            "I think this is a definition question about risk.",
        ]));
        let classifier = ModelClassifier::new(model, 4, 300);

        let plan = classifier.analyze("Qué es un nivel de riesgo?", None).await;
        assert!(plan.is_consistent());
    }

    #[tokio::test]
    async fn test_sub_query_cap() {
        let model = Arc::new(MockLanguageModel::with_responses(vec![
            r#"{"query_type": "list", "complexity": "complex", "requires_multihop": true,
                "sub_queries": ["a", "b", "c", "d", "e", "f"]}"#,
        ]));
        let classifier = ModelClassifier::new(model, 4, 300);

        let plan = classifier.analyze("list everything", None).await;
        assert_eq!(plan.sub_queries.len(), 4);
    }
}
