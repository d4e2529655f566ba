//! Configuration management for the DocQA retrieval core
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Language-model service configuration
    pub llm: LlmConfig,

    /// Retrieval gateway configuration
    pub gateway: GatewayConfig,

    /// Query classifier configuration
    pub classifier: ClassifierConfig,

    /// Hypothesis (HyDE) configuration
    pub hyde: HydeConfig,

    /// Fusion engine configuration
    pub fusion: FusionConfig,

    /// Context expansion configuration
    pub expansion: ExpansionConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai, local, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key for the completion service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per call (bounded, never retry-forever)
    #[serde(default = "default_llm_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Results requested per retrieval pass
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Per-pass timeout in milliseconds
    #[serde(default = "default_pass_timeout")]
    pub pass_timeout_ms: u64,

    /// Maximum concurrent gateway calls per question
    #[serde(default = "default_max_concurrent_passes")]
    pub max_concurrent_passes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Use the model-backed classifier (falls back to heuristics on failure)
    #[serde(default = "default_use_model")]
    pub use_model: bool,

    /// Maximum sub-queries accepted from decomposition
    #[serde(default = "default_max_sub_queries")]
    pub max_sub_queries: usize,

    /// Token budget for the classification call
    #[serde(default = "default_classifier_tokens")]
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HydeConfig {
    /// Enable hypothesis-document retrieval
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Default token budget when no template floor applies
    #[serde(default = "default_hyde_tokens")]
    pub default_max_tokens: usize,

    /// Minimum acceptable fused top score before reverting to
    /// original-query-only results
    #[serde(default = "default_score_floor")]
    pub score_floor: f32,

    /// Required relative improvement of the hybrid top score over the
    /// original-only top score (0.2 = 20%)
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f32,

    /// RRF weight for the hypothesis pass
    #[serde(default = "default_hypothesis_weight")]
    pub hypothesis_weight: f32,

    /// RRF weight for the original-query pass
    #[serde(default = "default_original_weight")]
    pub original_weight: f32,

    /// RRF smoothing constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FusionConfig {
    /// Agreement boost for chunks seen by exactly one pass
    #[serde(default = "default_boost_single")]
    pub boost_single: f32,

    /// Agreement boost for chunks seen by two passes
    #[serde(default = "default_boost_double")]
    pub boost_double: f32,

    /// Agreement boost for chunks seen by three or more passes
    #[serde(default = "default_boost_many")]
    pub boost_many: f32,

    /// Overall chunk budget after fusion
    #[serde(default = "default_chunk_budget")]
    pub chunk_budget: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpansionConfig {
    /// Sibling/adjacent window on each side of a seed chunk
    #[serde(default = "default_window")]
    pub window: usize,

    /// Hierarchy level treated as a hard boundary; expansion never pulls
    /// chunks whose path diverges from the seed at or above this depth
    #[serde(default = "default_boundary_level")]
    pub hard_boundary_level: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 15 }
fn default_llm_attempts() -> u32 { 3 }
fn default_top_k() -> usize { 20 }
fn default_pass_timeout() -> u64 { 5_000 }
fn default_max_concurrent_passes() -> usize { 4 }
fn default_use_model() -> bool { true }
fn default_max_sub_queries() -> usize { 4 }
fn default_classifier_tokens() -> usize { 300 }
fn default_enabled() -> bool { true }
fn default_hyde_tokens() -> usize { 150 }
fn default_score_floor() -> f32 { 0.30 }
fn default_min_improvement() -> f32 { 0.20 }
fn default_hypothesis_weight() -> f32 { 0.7 }
fn default_original_weight() -> f32 { 0.3 }
fn default_rrf_k() -> f32 { 60.0 }
fn default_boost_single() -> f32 { 1.0 }
fn default_boost_double() -> f32 { 1.3 }
fn default_boost_many() -> f32 { 1.5 }
fn default_chunk_budget() -> usize { 50 }
fn default_window() -> usize { 1 }
fn default_boundary_level() -> u32 { 1 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "docqa".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__GATEWAY__TOP_K=30
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the per-pass gateway timeout as Duration
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.pass_timeout_ms)
    }

    /// Get the language-model request timeout as Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: default_llm_provider(),
                api_key: None,
                api_base: None,
                model: default_llm_model(),
                timeout_secs: default_llm_timeout(),
                max_attempts: default_llm_attempts(),
            },
            gateway: GatewayConfig {
                top_k: default_top_k(),
                pass_timeout_ms: default_pass_timeout(),
                max_concurrent_passes: default_max_concurrent_passes(),
            },
            classifier: ClassifierConfig {
                use_model: default_use_model(),
                max_sub_queries: default_max_sub_queries(),
                max_tokens: default_classifier_tokens(),
            },
            hyde: HydeConfig {
                enabled: default_enabled(),
                default_max_tokens: default_hyde_tokens(),
                score_floor: default_score_floor(),
                min_improvement: default_min_improvement(),
                hypothesis_weight: default_hypothesis_weight(),
                original_weight: default_original_weight(),
                rrf_k: default_rrf_k(),
            },
            fusion: FusionConfig {
                boost_single: default_boost_single(),
                boost_double: default_boost_double(),
                boost_many: default_boost_many(),
                chunk_budget: default_chunk_budget(),
            },
            expansion: ExpansionConfig {
                window: default_window(),
                hard_boundary_level: default_boundary_level(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                service_name: default_service_name(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.fusion.chunk_budget, 50);
        assert_eq!(config.hyde.hypothesis_weight, 0.7);
        assert_eq!(config.hyde.original_weight, 0.3);
    }

    #[test]
    fn test_boost_table_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.fusion.boost_single, 1.0);
        assert_eq!(config.fusion.boost_double, 1.3);
        assert_eq!(config.fusion.boost_many, 1.5);
    }

    #[test]
    fn test_timeout_durations() {
        let config = AppConfig::default();
        assert_eq!(config.pass_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.llm_timeout(), Duration::from_secs(15));
    }
}
