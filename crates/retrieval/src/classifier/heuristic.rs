//! Deterministic keyword-heuristic classifier
//!
//! Fallback strategy behind the classifier capability: no external calls,
//! fully deterministic, unit-testable. Cue lists cover English and Spanish
//! since the corpora mix both.
//!
//! Priority when cues disagree (first match wins):
//! enumeration/objectives > numerical > procedural > comparison >
//! conditional > definition > generic.

use crate::plan::{Complexity, QueryPlan, QueryType};

/// Cues for enumeration-style questions
const ENUMERATION_CUES: &[&str] = &[
    "what are the",
    "which are",
    "list the",
    "list of",
    "enumerate",
    "objectives",
    "cuales son",
    "cuáles son",
    "enumera",
    "objetivos",
    "listado de",
];

/// Cues for aggregate/total questions, checked inside the enumeration tier
const AGGREGATION_CUES: &[&str] = &[
    "in total",
    "overall",
    "across all",
    "all the sections",
    "en total",
    "en conjunto",
    "todas las secciones",
];

const NUMERICAL_CUES: &[&str] = &[
    "how many",
    "how much",
    "amount",
    "percentage",
    "threshold",
    "deadline",
    "cuantos",
    "cuántos",
    "cuantas",
    "cuántas",
    "monto",
    "porcentaje",
    "plazo",
    "nivel",
    "niveles",
    "sancion",
    "sanción",
    "sanciones",
];

const PROCEDURAL_CUES: &[&str] = &[
    "how do i",
    "how to",
    "steps to",
    "step by step",
    "procedure",
    "como se",
    "cómo se",
    "como puedo",
    "cómo puedo",
    "pasos para",
    "procedimiento",
];

const COMPARISON_CUES: &[&str] = &[
    " vs ",
    " versus ",
    "compare",
    "difference between",
    "differences between",
    "comparar",
    "diferencia entre",
    "diferencias entre",
];

const CONDITIONAL_CUES: &[&str] = &[
    "what happens if",
    "what happens when",
    "if the",
    "in case of",
    "que pasa si",
    "qué pasa si",
    "que sucede si",
    "qué sucede si",
    "en caso de",
    "si se",
];

const DEFINITION_CUES: &[&str] = &[
    "what is",
    "what does",
    "define",
    "meaning of",
    "que es",
    "qué es",
    "que significa",
    "qué significa",
    "definicion de",
    "definición de",
];

const REASONING_CUES: &[&str] = &["why", "por que", "por qué"];

/// Compound-question connectives, split point keeps the right-hand
/// interrogative (byte offset past the joining word)
const COMPOUND_CONNECTIVES: &[(&str, usize)] = &[
    (" y que ", 3),
    (" y qué ", 3),
    (" y cuales ", 3),
    (" y cuáles ", 3),
    (" y cuantos ", 3),
    (" y cuántos ", 3),
    (" y como ", 3),
    (" y cómo ", 3),
    (" and what ", 5),
    (" and which ", 5),
    (" and how ", 5),
];

/// Deterministic classifier/decomposer
#[derive(Debug, Default, Clone)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a question without any external call.
    pub fn classify(&self, question: &str) -> QueryPlan {
        let (lower, offsets) = lowercase_with_offsets(question);

        let query_type = Self::detect_type(&lower);
        let sub_queries = Self::decompose(question, &lower, &offsets, query_type);

        let compound = sub_queries.len() >= 2;
        let multihop = compound
            || matches!(query_type, QueryType::Comparison | QueryType::Conditional)
            || Self::cue_tiers_hit(&lower) >= 2;

        let complexity = if multihop {
            Complexity::Complex
        } else if lower.split_whitespace().count() > 12 {
            Complexity::Medium
        } else {
            Complexity::Simple
        };

        if multihop {
            QueryPlan::multihop(question, query_type, complexity, sub_queries)
        } else {
            QueryPlan::single_pass(question, query_type, complexity)
        }
    }

    /// First match wins, in the fixed priority order.
    fn detect_type(lower: &str) -> QueryType {
        if contains_any(lower, ENUMERATION_CUES) {
            if contains_any(lower, AGGREGATION_CUES) {
                return QueryType::Aggregation;
            }
            return QueryType::List;
        }
        if contains_any(lower, NUMERICAL_CUES) {
            return QueryType::Numerical;
        }
        if contains_any(lower, PROCEDURAL_CUES) {
            return QueryType::Procedural;
        }
        if contains_any(lower, COMPARISON_CUES) {
            return QueryType::Comparison;
        }
        if contains_any(lower, CONDITIONAL_CUES) {
            return QueryType::Conditional;
        }
        if contains_any(lower, DEFINITION_CUES) {
            return QueryType::Definition;
        }
        if contains_any(lower, REASONING_CUES) {
            return QueryType::Reasoning;
        }
        QueryType::Generic
    }

    /// Number of distinct cue tiers present; two or more signals a hybrid
    /// question that benefits from multiple passes.
    fn cue_tiers_hit(lower: &str) -> usize {
        [
            ENUMERATION_CUES,
            NUMERICAL_CUES,
            PROCEDURAL_CUES,
            COMPARISON_CUES,
            CONDITIONAL_CUES,
        ]
        .iter()
        .filter(|cues| contains_any(lower, cues))
        .count()
    }

    /// Deterministic decomposition into ordered sub-queries.
    ///
    /// Compound questions split at their connective; comparisons split into
    /// left/right sides; conditionals into condition then consequence.
    /// Returns an empty list when no clean split exists — the caller then
    /// uses the original question as the sole sub-query.
    fn decompose(
        question: &str,
        lower: &str,
        offsets: &[usize],
        query_type: QueryType,
    ) -> Vec<String> {
        // Compound "A y qué B" questions split regardless of type
        for (connective, keep_from) in COMPOUND_CONNECTIVES {
            if let Some(idx) = lower.find(connective) {
                let left = question[..offsets[idx]].trim();
                let right = question[offsets[idx + keep_from]..].trim();
                if !left.is_empty() && !right.is_empty() {
                    return vec![left.to_string(), right.to_string()];
                }
            }
        }

        match query_type {
            QueryType::Comparison => {
                for sep in [" vs ", " versus "] {
                    if let Some(idx) = lower.find(sep) {
                        let left = question[..offsets[idx]].trim();
                        let right = question[offsets[idx + sep.len()]..].trim();
                        if !left.is_empty() && !right.is_empty() {
                            return vec![left.to_string(), right.to_string()];
                        }
                    }
                }
                for marker in ["difference between ", "differences between ", "diferencia entre ", "diferencias entre "] {
                    if let Some(idx) = lower.find(marker) {
                        let base = idx + marker.len();
                        for and_sep in [" and ", " y "] {
                            if let Some(and_idx) = lower[base..].find(and_sep) {
                                let and_at = base + and_idx;
                                let left = question[offsets[base]..offsets[and_at]].trim();
                                let right = question[offsets[and_at + and_sep.len()]..]
                                    .trim()
                                    .trim_end_matches(['?', '.']);
                                if !left.is_empty() && !right.is_empty() {
                                    return vec![left.to_string(), right.to_string()];
                                }
                            }
                        }
                    }
                }
                Vec::new()
            }
            QueryType::Conditional => {
                for sep in [", then ", " then ", ", entonces ", " entonces "] {
                    if let Some(idx) = lower.find(sep) {
                        let condition = question[..offsets[idx]].trim();
                        let consequence = question[offsets[idx + sep.len()]..].trim();
                        if !condition.is_empty() && !consequence.is_empty() {
                            return vec![condition.to_string(), consequence.to_string()];
                        }
                    }
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

/// Lowercase the question and map every byte of the lowered text back to
/// the byte offset of the original character that produced it.
///
/// Lowercasing can change byte lengths ('ẞ' becomes 'ß', 'İ' becomes
/// "i\u{307}"), so cue positions found in the lowered text are not valid
/// offsets into the original. The returned table has one extra entry so
/// `offsets[lower.len()] == question.len()`.
fn lowercase_with_offsets(question: &str) -> (String, Vec<usize>) {
    let mut lower = String::with_capacity(question.len());
    let mut offsets = Vec::with_capacity(question.len() + 1);

    for (original_idx, ch) in question.char_indices() {
        for lowered in ch.to_lowercase() {
            lower.push(lowered);
            offsets.resize(lower.len(), original_idx);
        }
    }
    offsets.push(question.len());

    (lower, offsets)
}

fn contains_any(haystack: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| haystack.contains(cue))
}
