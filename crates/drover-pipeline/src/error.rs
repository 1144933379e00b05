//! Error types for the transaction pipeline.

use drover_chain::ChainError;
use drover_queue::QueueError;
use thiserror::Error;

/// Errors that can occur while running a job's pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The remote service answered with an unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// On-chain operation failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Job store operation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad settings or prompt files.
    #[error("configuration error: {0}")]
    Config(String),

    /// A failure that another attempt cannot fix.
    #[error("{0}")]
    NonRetryable(String),

    /// An operation gave up, carrying its last error.
    #[error("{operation}: {source}")]
    Exhausted {
        operation: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// The innermost error, looking through [`PipelineError::Exhausted`].
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Exhausted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        match self.root() {
            PipelineError::Queue(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Whether the failure was already written to the wallet's report.
    pub fn is_reported(&self) -> bool {
        matches!(self.root(), PipelineError::Chain(ChainError::Reverted { .. }))
    }

    /// The store error behind a fatal failure, if any.
    pub fn into_queue_error(self) -> Option<QueueError> {
        match self {
            PipelineError::Queue(e) => Some(e),
            PipelineError::Exhausted { source, .. } => source.into_queue_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_through_exhausted() {
        let err = PipelineError::Exhausted {
            operation: "swap".into(),
            source: Box::new(PipelineError::Queue(QueueError::DataStore("gone".into()))),
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "swap: data store consistency violation: gone"
        );
        assert!(matches!(
            err.into_queue_error(),
            Some(QueueError::DataStore(_))
        ));
    }

    #[test]
    fn test_revert_is_reported() {
        let err = PipelineError::Exhausted {
            operation: "bridge".into(),
            source: Box::new(PipelineError::Chain(ChainError::Reverted {
                link: "https://basescan.org/tx/0x1".into(),
            })),
        };
        assert!(err.is_reported());
        assert!(!err.is_fatal());
        assert!(!PipelineError::Protocol("x".into()).is_reported());
    }
}
