//! Question-to-context orchestration
//!
//! Owns the per-question flow: classify, optionally generate a hypothesis,
//! execute retrieval passes, fuse, expand. Every dependency is injected at
//! construction and the pipeline itself is stateless, so one instance serves
//! concurrent questions.

use crate::classifier::QueryClassifier;
use crate::expansion::{ContextExpander, ExpansionOptions};
use crate::fusion::{
    agreement_histogram, FusedResultSet, HydeFusion, MultihopEngine, RetrievalMetrics,
    RetrievalPass,
};
use crate::gateway::{RetrievalGateway, SearchFilter};
use crate::hyde::{Hypothesis, HypothesisGenerator};
use crate::plan::{DocumentScope, FusionStrategy, QueryPlan};
use docqa_common::config::{AppConfig, GatewayConfig};
use docqa_common::errors::{AppError, Result};
use docqa_common::graph::ChunkGraph;
use docqa_common::metrics::{self, QuestionTimer};
use std::sync::Arc;
use tracing::{info, instrument};

/// The retrieval orchestration core.
///
/// Construct once at startup with the gateway, classifier, and (optionally)
/// a language model for hypothesis generation; share via `Arc`.
pub struct RetrievalPipeline {
    classifier: Arc<dyn QueryClassifier>,
    hypothesis: Option<HypothesisGenerator>,
    engine: MultihopEngine,
    hybrid: HydeFusion,
    expander: ContextExpander,
    gateway_config: GatewayConfig,
    chunk_budget: usize,
}

impl RetrievalPipeline {
    pub fn new(
        graph: Arc<ChunkGraph>,
        gateway: Arc<dyn RetrievalGateway>,
        classifier: Arc<dyn QueryClassifier>,
        hypothesis: Option<HypothesisGenerator>,
        config: &AppConfig,
    ) -> Self {
        let hypothesis = if config.hyde.enabled { hypothesis } else { None };
        Self {
            classifier,
            hypothesis,
            engine: MultihopEngine::new(gateway, config.fusion.clone(), config.gateway.clone()),
            hybrid: HydeFusion::new(config.hyde.clone()),
            expander: ContextExpander::new(graph, ExpansionOptions::from_config(&config.expansion)),
            gateway_config: config.gateway.clone(),
            chunk_budget: config.fusion.chunk_budget,
        }
    }

    /// Retrieve and assemble the answer context for one question.
    ///
    /// Never fails because of a degraded stage: classification falls back to
    /// heuristics, hypothesis failure falls back to the plain query, and a
    /// failed pass becomes an empty one. An `Err` here means the question
    /// was rejected up front or the pipeline itself is broken, not that the
    /// corpus had no answer; "no answer" is an `Ok` result with `exhausted`
    /// set.
    #[instrument(skip(self), fields(area = %filter.area))]
    pub async fn answer_context(
        &self,
        question: &str,
        filter: &SearchFilter,
        scope: Option<&DocumentScope>,
    ) -> Result<FusedResultSet> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation {
                message: "question must not be blank".to_string(),
            });
        }

        let timer = QuestionTimer::start();
        let plan = self.classifier.analyze(question, scope).await;
        info!(
            query_type = ?plan.query_type,
            multihop = plan.requires_multihop,
            sub_queries = plan.sub_queries.len(),
            "question planned"
        );

        let mut result = match (&self.hypothesis, plan.fusion_strategy) {
            // Hypothesis retrieval only helps focused single-pass questions;
            // enumeration and multihop shapes go straight to the engine
            (Some(generator), FusionStrategy::Standard) => {
                match generator
                    .generate(question, plan.query_type, Some(&filter.area))
                    .await?
                {
                    Some(hypothesis) => self.hybrid_retrieve(&plan, &hypothesis, filter).await?,
                    None => self.engine.retrieve(&plan, filter).await?,
                }
            }
            _ => self.engine.retrieve(&plan, filter).await?,
        };

        self.expander.expand(&mut result.chunks);

        metrics::record_fusion(
            result.metrics.total_chunks,
            &result.metrics.agreement_histogram,
        );
        timer.finish(
            result.metrics.multihop_used,
            result.metrics.hyde_used,
            result.exhausted,
        );
        Ok(result)
    }

    /// Run the hypothesis pass and the original-query pass, then blend.
    async fn hybrid_retrieve(
        &self,
        plan: &QueryPlan,
        hypothesis: &Hypothesis,
        filter: &SearchFilter,
    ) -> Result<FusedResultSet> {
        let queries = vec![
            (hypothesis.text.clone(), true),
            (plan.original_query.clone(), false),
        ];
        let (passes, payloads) = self
            .engine
            .execute_passes(&queries, filter, self.gateway_config.top_k)
            .await;

        let hypothesis_pass = find_pass(&passes, 0)?;
        let original_pass = find_pass(&passes, 1)?;
        let outcome = self
            .hybrid
            .fuse(hypothesis_pass, original_pass, &payloads, self.chunk_budget);

        let exhausted = passes.iter().all(|p| p.results.is_empty());
        let metrics = RetrievalMetrics {
            pass_count: passes.len(),
            failed_passes: passes.iter().filter(|p| p.error.is_some()).count(),
            total_chunks: outcome.chunks.len(),
            agreement_histogram: agreement_histogram(&outcome.chunks),
            hyde_used: true,
            multihop_used: false,
            hyde_reverted: outcome.reverted,
        };

        Ok(FusedResultSet {
            chunks: outcome.chunks,
            plan: plan.clone(),
            exhausted,
            metrics,
        })
    }
}

fn find_pass(passes: &[RetrievalPass], index: usize) -> Result<&RetrievalPass> {
    passes
        .iter()
        .find(|p| p.pass_index == index)
        .ok_or_else(|| AppError::Internal {
            message: format!("retrieval pass {} missing", index),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::HeuristicClassifier;
    use crate::gateway::InMemoryGateway;
    use docqa_common::graph::Chunk;
    use docqa_common::llm::MockLanguageModel;
    use uuid::Uuid;

    fn corpus() -> Arc<ChunkGraph> {
        let doc = Uuid::from_u128(1);
        let sections: &[(&str, &[&str])] = &[
            (
                "Definitions",
                &["Residual risk means the risk remaining after mitigation controls are applied."],
            ),
            (
                "Sanctions",
                &["Severe infractions carry monetary sanctions and license suspension penalties."],
            ),
        ];

        let mut chunks = Vec::new();
        for (section, texts) in sections {
            let heading = Uuid::new_v4();
            chunks.push(Chunk {
                id: heading,
                document_id: doc,
                area: "compliance".into(),
                text: section.to_string(),
                hierarchy_level: 1,
                hierarchy_path: vec!["manual".into(), section.to_string()],
                parent_id: None,
                children_ids: vec![],
                sibling_order: 0,
                token_count: 2,
            });
            for (i, text) in texts.iter().enumerate() {
                chunks.push(Chunk {
                    id: Uuid::new_v4(),
                    document_id: doc,
                    area: "compliance".into(),
                    text: text.to_string(),
                    hierarchy_level: 2,
                    hierarchy_path: vec![
                        "manual".into(),
                        section.to_string(),
                        format!("p{}", i),
                    ],
                    parent_id: Some(heading),
                    children_ids: vec![],
                    sibling_order: i as u32,
                    token_count: 20,
                });
            }
        }
        Arc::new(ChunkGraph::new(chunks))
    }

    fn pipeline(
        graph: Arc<ChunkGraph>,
        hypothesis: Option<HypothesisGenerator>,
    ) -> RetrievalPipeline {
        let gateway = Arc::new(InMemoryGateway::new(Arc::clone(&graph)));
        RetrievalPipeline::new(
            graph,
            gateway,
            Arc::new(HeuristicClassifier::default()),
            hypothesis,
            &AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_single_pass_without_model() {
        let pipeline = pipeline(corpus(), None);
        let result = pipeline
            .answer_context(
                "What does residual risk mean?",
                &SearchFilter::area("compliance"),
                None,
            )
            .await
            .unwrap();

        assert!(!result.exhausted);
        assert!(!result.metrics.hyde_used);
        assert_eq!(result.metrics.pass_count, 1);
        assert!(result
            .chunks
            .iter()
            .any(|c| c.chunk.text.contains("Residual risk")));
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let pipeline = pipeline(corpus(), None);
        let err = pipeline
            .answer_context("   ", &SearchFilter::area("compliance"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_hypothesis_failure_degrades_to_plain_query() {
        let graph = corpus();
        let generator =
            HypothesisGenerator::new(Arc::new(MockLanguageModel::failing()), 150);
        let pipeline = pipeline(graph, Some(generator));

        let result = pipeline
            .answer_context(
                "What does residual risk mean?",
                &SearchFilter::area("compliance"),
                None,
            )
            .await
            .unwrap();

        assert!(!result.metrics.hyde_used);
        assert!(!result.metrics.hyde_reverted);
        assert!(!result.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_hypothesis_used_on_definition_question() {
        let graph = corpus();
        let model = MockLanguageModel::with_responses(vec![
            "Residual risk means the remaining risk after mitigation controls are applied.",
        ]);
        let generator = HypothesisGenerator::new(Arc::new(model), 150);
        let pipeline = pipeline(graph, Some(generator));

        let result = pipeline
            .answer_context(
                "What does residual risk mean?",
                &SearchFilter::area("compliance"),
                None,
            )
            .await
            .unwrap();

        assert!(result.metrics.hyde_used);
        assert_eq!(result.metrics.pass_count, 2);
    }

    #[tokio::test]
    async fn test_multihop_skips_hypothesis() {
        let graph = corpus();
        // If the hypothesis path ran it would consume this mock response
        let model = MockLanguageModel::with_responses(vec!["unused"]);
        let generator = HypothesisGenerator::new(Arc::new(model), 150);
        let pipeline = pipeline(graph, Some(generator));

        let result = pipeline
            .answer_context(
                "What are the risk levels and what sanctions apply?",
                &SearchFilter::area("compliance"),
                None,
            )
            .await
            .unwrap();

        assert!(result.metrics.multihop_used);
        assert!(!result.metrics.hyde_used);
        assert!(result.metrics.pass_count >= 2);
    }

    #[tokio::test]
    async fn test_compound_spanish_question_fuses_across_passes() {
        let doc = Uuid::from_u128(2);
        let make = |text: &str, order: u32| Chunk {
            id: Uuid::new_v4(),
            document_id: doc,
            area: "compliance".into(),
            text: text.to_string(),
            hierarchy_level: 1,
            hierarchy_path: vec!["manual".into(), format!("s{}", order)],
            parent_id: None,
            children_ids: vec![],
            sibling_order: order,
            token_count: 15,
        };
        let bridge = make(
            "Los niveles de riesgo determinan las sanciones que aplican a cada infracción.",
            0,
        );
        let bridge_id = bridge.id;
        let graph = Arc::new(ChunkGraph::new(vec![
            bridge,
            make("Los niveles de riesgo se clasifican en bajo, medio y alto.", 1),
            make("Las sanciones aplican según la gravedad de la infracción.", 2),
        ]));
        let pipeline = pipeline(graph, None);

        let result = pipeline
            .answer_context(
                "Cuáles son los niveles de riesgo y qué sanciones aplican?",
                &SearchFilter::area("compliance"),
                None,
            )
            .await
            .unwrap();

        assert!(result.metrics.multihop_used);
        assert_eq!(result.metrics.pass_count, 2);

        // The chunk seen by both passes is boosted above every single-pass
        // chunk and ranks first
        let top = &result.chunks[0];
        assert_eq!(top.chunk.id, bridge_id);
        assert_eq!(top.source_passes, vec![0, 1]);

        let best_raw = 2.0 / 3.0;
        assert!((top.fused_score - best_raw * 1.3).abs() < 1e-4);
        assert!(result
            .metrics
            .agreement_histogram
            .contains(&(2, 1)));
    }

    #[tokio::test]
    async fn test_empty_corpus_is_exhausted_not_error() {
        let graph = Arc::new(ChunkGraph::new(vec![]));
        let pipeline = pipeline(graph, None);

        let result = pipeline
            .answer_context(
                "What does residual risk mean?",
                &SearchFilter::area("compliance"),
                None,
            )
            .await
            .unwrap();

        assert!(result.exhausted);
        assert!(result.chunks.is_empty());
        assert_eq!(result.metrics.total_chunks, 0);
    }
}
