//! The chain operations the transaction pipeline relies on.

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, B256, Bytes, U256, utils::format_units};
use async_trait::async_trait;

use crate::{Chain, ChainError, GasParameters};

/// An executable transaction handed over by a remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDescriptor {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Gas limit; estimated when absent.
    pub gas: Option<u64>,
}

/// An ERC-20 balance with the token's precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    /// Balance in whole tokens. Precision beyond an f64 is dropped.
    pub fn as_f64(&self) -> f64 {
        format_units(self.raw, self.decimals)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0)
    }
}

/// One wallet's view of every configured chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn address(&self) -> Address;

    async fn native_balance(&self, chain: Chain) -> Result<U256, ChainError>;

    async fn token_balance(&self, chain: Chain, token: Address) -> Result<TokenAmount, ChainError>;

    async fn gas_parameters(&self, chain: Chain) -> Result<GasParameters, ChainError>;

    /// Sign and broadcast `tx`, returning its hash.
    async fn submit(&self, chain: Chain, tx: TxDescriptor) -> Result<B256, ChainError>;

    /// Wait for a successful receipt. A revert is [`ChainError::Reverted`].
    async fn await_confirmation(&self, chain: Chain, hash: B256) -> Result<B256, ChainError>;

    /// Approve `spender` for `value` of `token`.
    ///
    /// Without `force`, nothing is sent when the current allowance already
    /// covers `value` and `None` is returned.
    async fn approve(
        &self,
        chain: Chain,
        token: Address,
        spender: Address,
        value: U256,
        force: bool,
    ) -> Result<Option<B256>, ChainError>;

    /// Poll the native balance until it moves away from `baseline`, or above
    /// it when `only_increase` is set.
    async fn await_balance_change(
        &self,
        chain: Chain,
        baseline: U256,
        only_increase: bool,
    ) -> Result<U256, ChainError>;

    /// EIP-191 personal signature, 0x-prefixed hex.
    async fn sign_message(&self, message: &str) -> Result<String, ChainError>;

    /// EIP-712 signature over `typed`, 0x-prefixed hex.
    async fn sign_typed_data(&self, typed: &TypedData) -> Result<String, ChainError>;

    /// Block until mainnet gas is below the configured ceiling.
    async fn wait_for_gwei(&self) -> Result<(), ChainError>;

    fn explorer_link(&self, chain: Chain, hash: B256) -> String;
}
