//! Error type for the drover binary.

use std::path::PathBuf;

use drover_chain::ChainError;
use drover_pipeline::PipelineError;
use drover_queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Settings or input files are unusable.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
