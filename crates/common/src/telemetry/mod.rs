//! Tracing initialization
//!
//! Embedding services call this once at startup. Safe to call more than
//! once; later calls are ignored.

use crate::config::ObservabilityConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let installed = if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    };

    if installed {
        info!(
            service = %config.service_name,
            level = %config.log_level,
            "tracing initialized"
        );
    }
}
