//! Worker error types.

use thiserror::Error;

use crate::config::ConfigError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that stop a command. Per-scene failures never surface here; they
/// are recorded in the scene's result.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] scenegen_models::ModelError),

    #[error("Provider error: {0}")]
    Provider(#[from] scenegen_providers::ProviderError),

    #[error("Report error: {0}")]
    Report(#[from] scenegen_report::ReportError),

    #[error("Nothing to do: {0}")]
    NothingToDo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn nothing_to_do(msg: impl Into<String>) -> Self {
        Self::NothingToDo(msg.into())
    }
}
