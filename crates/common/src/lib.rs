//! DocQA Common Library
//!
//! Shared code for the DocQA retrieval core including:
//! - Chunk graph model (hierarchical document chunks as an id-indexed arena)
//! - Language-model client abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod graph;
pub mod llm;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use graph::{Chunk, ChunkGraph};
pub use llm::LanguageModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default per-pass chunk budget for gateway calls
pub const DEFAULT_TOP_K: usize = 20;

/// Default overall chunk budget after fusion
pub const DEFAULT_CHUNK_BUDGET: usize = 50;
