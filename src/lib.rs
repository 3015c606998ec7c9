pub mod assemble;
pub mod audit;
pub mod config;
pub mod db;
pub mod engine;
pub mod fees;
pub mod models;
pub mod processor;
pub mod reconcile;
pub mod sequence;
pub mod x12;

pub use processor::{BillingOutcome, BillingProcessor, PipelineError};

use tracing_subscriber::EnvFilter;

/// Initialize tracing for embedding applications. RUST_LOG wins over
/// the built-in default filter.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
}
