//! Error types for the job queue.

use thiserror::Error;

/// Errors that can occur in queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Store file could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store file is not valid JSON for its document type.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad input files or parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// Wrong vault passphrase or tampered ciphertext.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The stored ground truth no longer matches what a worker claimed.
    ///
    /// Never retried: continuing would process a wallet whose state changed underneath us.
    #[error("data store consistency violation: {0}")]
    DataStore(String),

    /// Wallet is not present in the store.
    #[error("wallet not found: {0}")]
    WalletNotFound(String),
}

impl QueueError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueueError::DataStore(_))
    }
}
