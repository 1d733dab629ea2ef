//! Harness error types.

use nrm_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("batch worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
}
