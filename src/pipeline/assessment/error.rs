//! Engine-level error type.
//!
//! Per-task failures never surface here: they become failed
//! `AssessmentResult` values. Only section-fatal problems propagate.

use thiserror::Error;

use crate::imaging::ImageError;
use crate::llm::LlmError;
use crate::pipeline_config::ConfigError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AssessmentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Settings error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),
}
