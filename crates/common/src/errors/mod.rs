//! Error types for the DocQA retrieval core
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Recoverability classification (every retrieval failure degrades,
//!   nothing here is fatal to the enclosing process)
//! - Structured logging at the point of recovery

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Stage at which a retrieval failure occurred, for diagnostics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Classification,
    HypothesisGeneration,
    GatewayPass,
    Fusion,
    Expansion,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Classification errors (recovered via heuristic fallback)
    #[error("Classification failed: {message}")]
    Classification { message: String },

    #[error("Classifier returned unparsable output: {message}")]
    UnparsablePlan { message: String },

    // Hypothesis generation errors (recovered by disabling the HyDE path)
    #[error("Hypothesis generation failed: {message}")]
    Generation { message: String },

    // Retrieval gateway errors (recovered by treating the pass as empty)
    #[error("Gateway search failed: {message}")]
    GatewayError { message: String },

    #[error("Gateway search timed out after {timeout_ms}ms")]
    GatewayTimeout { timeout_ms: u64 },

    // Language-model service errors
    #[error("Language model error: {message}")]
    LlmError { message: String },

    #[error("Language model timed out after {timeout_ms}ms")]
    LlmTimeout { timeout_ms: u64 },

    #[error("Language model exhausted {attempts} attempts: {message}")]
    LlmExhausted { attempts: u32, message: String },

    // Validation errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // Infrastructure errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the pipeline stage this error belongs to, if any
    pub fn stage(&self) -> Option<FailureStage> {
        match self {
            AppError::Classification { .. } | AppError::UnparsablePlan { .. } => {
                Some(FailureStage::Classification)
            }
            AppError::Generation { .. } => Some(FailureStage::HypothesisGeneration),
            AppError::GatewayError { .. } | AppError::GatewayTimeout { .. } => {
                Some(FailureStage::GatewayPass)
            }
            _ => None,
        }
    }

    /// Check if this error is recovered locally inside the pipeline.
    ///
    /// Recoverable errors never surface to the caller: classification falls
    /// back to the heuristic, hypothesis failures disable HyDE for the
    /// question, and gateway failures become empty passes.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Classification { .. }
                | AppError::UnparsablePlan { .. }
                | AppError::Generation { .. }
                | AppError::GatewayError { .. }
                | AppError::GatewayTimeout { .. }
                | AppError::LlmError { .. }
                | AppError::LlmTimeout { .. }
                | AppError::LlmExhausted { .. }
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
