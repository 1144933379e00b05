//! EVM chain access for drover.
//!
//! This crate provides:
//! - An immutable table of chains and their RPC endpoints
//! - The gas fee policy used for every transaction
//! - The [`ChainClient`] trait the pipeline drives
//! - [`EvmChain`], an alloy-backed client bound to one wallet

mod chain;
mod client;
mod erc20;
mod error;
mod evm;
mod gas;

pub use chain::{Chain, ChainConfig, ChainTable};
pub use client::{ChainClient, TokenAmount, TxDescriptor};
pub use erc20::{decode_approve, encode_approve};
pub use error::{ChainError, TransactionError};
pub use evm::{EvmChain, proxy_url};
pub use gas::{CONGESTION_SURCHARGE, GasParameters, compute_gas};

pub use alloy::dyn_abi::TypedData;
pub use alloy::primitives::{Address, B256, Bytes, U256};
