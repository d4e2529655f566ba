//! Hypothesis-document generation (HyDE)
//!
//! Writes a synthetic "hypothetical answer" shaped like the passage that
//! would answer the question, then retrieval embeds that text instead of
//! the bare question. Templates are keyed by query type and document type;
//! each template fixes a token-budget floor that a caller-supplied default
//! can raise but never lower.
//!
//! Generation failure is not an error: the caller disables the hypothesis
//! path for the question and retrieves with the original query.

use crate::plan::QueryType;
use docqa_common::errors::Result;
use docqa_common::llm::LanguageModel;
use docqa_common::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A generated hypothetical answer document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Synthetic answer text used as the alternative query
    pub text: String,

    /// Token cost of the generation call
    pub generation_cost: usize,
}

/// Template-driven hypothesis generator
pub struct HypothesisGenerator {
    model: Arc<dyn LanguageModel>,
    default_max_tokens: usize,
}

impl HypothesisGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, default_max_tokens: usize) -> Self {
        Self {
            model,
            default_max_tokens,
        }
    }

    /// Token budget for a query type: the template floor, raised to the
    /// caller default when that is larger.
    pub fn token_budget(&self, query_type: QueryType) -> usize {
        let floor = match query_type {
            QueryType::List | QueryType::Aggregation | QueryType::Procedural => 200,
            QueryType::Comparison => 180,
            QueryType::Numerical | QueryType::Definition => 150,
            _ => 150,
        };
        self.default_max_tokens.max(floor)
    }

    /// Generate a hypothetical answer document for the question.
    ///
    /// Returns `Ok(None)` when generation fails; callers must fall back to
    /// direct-query retrieval without aborting the question.
    pub async fn generate(
        &self,
        question: &str,
        query_type: QueryType,
        document_type: Option<&str>,
    ) -> Result<Option<Hypothesis>> {
        let prompt = Self::template(question, query_type, document_type);
        let budget = self.token_budget(query_type);

        match self.model.complete(&prompt, budget).await {
            Ok(completion) if !completion.text.trim().is_empty() => {
                debug!(
                    query_type = ?query_type,
                    tokens = completion.tokens_used,
                    "hypothesis generated"
                );
                Ok(Some(Hypothesis {
                    text: completion.text,
                    generation_cost: completion.tokens_used,
                }))
            }
            Ok(_) => {
                warn!("Hypothesis generation returned empty text, disabling HyDE");
                metrics::record_hypothesis_failure();
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Hypothesis generation failed, disabling HyDE");
                metrics::record_hypothesis_failure();
                Ok(None)
            }
        }
    }

    /// Prompt template keyed by (query type, document type)
    fn template(question: &str, query_type: QueryType, document_type: Option<&str>) -> String {
        let doc_kind = document_type.unwrap_or("document");

        let shape = match query_type {
            QueryType::Definition => {
                "Write the definition passage that would answer it: a precise \
                 statement of what the term means, its scope, and one clarifying detail."
            }
            QueryType::List | QueryType::Aggregation => {
                "Write the enumerating passage that would answer it: a complete \
                 itemized list with every element named and briefly described."
            }
            QueryType::Numerical => {
                "Write the passage that would answer it: the exact figures, \
                 thresholds, or deadlines, with their units and conditions."
            }
            QueryType::Procedural => {
                "Write the procedure passage that would answer it: ordered steps \
                 from start to finish, each with its actor and requirement."
            }
            QueryType::Comparison => {
                "Write the contrasting passage that would answer it: both sides \
                 described in parallel, then their differences stated explicitly."
            }
            QueryType::Conditional => {
                "Write the passage that would answer it: the condition, the \
                 consequence that follows, and any exceptions."
            }
            QueryType::Reasoning => {
                "Write the explanatory passage that would answer it: the \
                 rationale, the governing rule, and its justification."
            }
            QueryType::Generic => {
                "Write the passage that would answer it, in the style of the \
                 source material."
            }
        };

        format!(
            "You are drafting a passage from a {doc_kind} in the question's \
             own language. Do not address the reader and do not mention the \
             question.\n\nQuestion: {question}\n\n{shape}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_common::llm::MockLanguageModel;

    #[test]
    fn test_token_floors() {
        let model = Arc::new(MockLanguageModel::with_responses(vec![]));
        let generator = HypothesisGenerator::new(model, 100);

        assert_eq!(generator.token_budget(QueryType::List), 200);
        assert_eq!(generator.token_budget(QueryType::Procedural), 200);
        assert_eq!(generator.token_budget(QueryType::Comparison), 180);
        assert_eq!(generator.token_budget(QueryType::Definition), 150);
        assert_eq!(generator.token_budget(QueryType::Numerical), 150);
    }

    #[test]
    fn test_caller_default_never_lowers_floor() {
        let model = Arc::new(MockLanguageModel::with_responses(vec![]));
        let generator = HypothesisGenerator::new(model, 50);
        assert_eq!(generator.token_budget(QueryType::Numerical), 150);

        let model = Arc::new(MockLanguageModel::with_responses(vec![]));
        let generator = HypothesisGenerator::new(model, 400);
        assert_eq!(generator.token_budget(QueryType::Numerical), 400);
    }

    #[tokio::test]
    async fn test_generation() {
        let model = Arc::new(MockLanguageModel::with_responses(vec![
            "Los niveles de riesgo son bajo, medio y alto. A cada nivel corresponde una sanción.",
        ]));
        let generator = HypothesisGenerator::new(model, 150);

        let hypothesis = generator
            .generate("Cuáles son los niveles de riesgo?", QueryType::List, Some("regulation"))
            .await
            .unwrap()
            .unwrap();

        assert!(hypothesis.text.contains("niveles de riesgo"));
        assert!(hypothesis.generation_cost > 0);
    }

    #[tokio::test]
    async fn test_failure_yields_none_not_error() {
        let model = Arc::new(MockLanguageModel::failing());
        let generator = HypothesisGenerator::new(model, 150);

        let result = generator
            .generate("anything", QueryType::Definition, None)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
