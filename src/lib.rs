pub mod config;
pub mod pipeline_config; // Validated assessment settings
pub mod models;
pub mod pipeline; // Granular assessment engine
pub mod storage; // Object storage collaborator
pub mod llm; // LLM transport collaborator
pub mod imaging; // Page image preparation

pub use pipeline::assessment::{GranularAssessmentService, SectionOutcome, SkipReason};
pub use pipeline_config::ServiceConfig;

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
}
