//! Error types for chain access.

use thiserror::Error;

/// A transaction that could not be signed or broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionError {
    pub message: String,
    pub code: String,
    /// Hex of the signed transaction, empty when signing never happened.
    pub encoded_tx: String,
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.message, self.code)?;
        if !self.encoded_tx.is_empty() {
            write!(f, " | encoded tx: {}", self.encoded_tx)?;
        }
        Ok(())
    }
}

impl std::error::Error for TransactionError {}

/// Errors that can occur when talking to a chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC call failed.
    #[error("RPC error: {0}")]
    Rpc(#[from] alloy::transports::TransportError),

    /// No endpoints configured for a chain.
    #[error("no RPC endpoints configured for {0}")]
    NoEndpoints(String),

    /// Endpoint URL could not be parsed.
    #[error("invalid RPC endpoint {url}: {reason}")]
    BadEndpoint { url: String, reason: String },

    /// The node answered with something we cannot use.
    #[error("unexpected RPC response: {0}")]
    UnexpectedResponse(String),

    /// Unknown chain name.
    #[error("unsupported chain: {0}")]
    UnknownChain(String),

    /// Submission failed.
    #[error("{0}")]
    Transaction(#[from] TransactionError),

    /// The transaction was mined but reverted.
    #[error("transaction reverted: {link}")]
    Reverted { link: String },

    /// No receipt within the configured wait.
    #[error("transaction {hash} not confirmed after {secs}s")]
    ReceiptTimeout { hash: String, secs: u64 },

    /// Balance never moved within the configured wait.
    #[error("balance on {chain} did not change after {secs}s")]
    BalanceTimeout { chain: String, secs: u64 },

    /// Mainnet gas stayed above the ceiling.
    #[error("gas price stayed above {max_gwei} gwei")]
    GasTimeout { max_gwei: f64 },

    /// Local signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Private key could not be parsed.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// A transaction or call payload could not be built or decoded.
    #[error("invalid transaction data: {0}")]
    InvalidTx(String),

    /// HTTP client setup failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ChainError {
    /// Transport level failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Rpc(_) | ChainError::ReceiptTimeout { .. } | ChainError::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_display() {
        let err = TransactionError {
            message: "insufficient funds for gas".into(),
            code: "-32000".into(),
            encoded_tx: String::new(),
        };
        assert_eq!(err.to_string(), "insufficient funds for gas: -32000");

        let err = TransactionError {
            encoded_tx: "0x02f8".into(),
            ..err
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds for gas: -32000 | encoded tx: 0x02f8"
        );
    }

    #[test]
    fn test_reverted_is_not_transient() {
        let err = ChainError::Reverted {
            link: "https://basescan.org/tx/0x1".into(),
        };
        assert!(!err.is_transient());
        assert!(
            ChainError::ReceiptTimeout {
                hash: "0x1".into(),
                secs: 5
            }
            .is_transient()
        );
    }
}
