//! ERC-20 calldata.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;

use crate::ChainError;

alloy::sol! {
    interface IERC20 {
        function approve(address spender, uint256 value) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

pub fn encode_approve(spender: Address, value: U256) -> Bytes {
    IERC20::approveCall { spender, value }.abi_encode().into()
}

/// Spender and amount from `approve` calldata.
pub fn decode_approve(data: &[u8]) -> Result<(Address, U256), ChainError> {
    let call = IERC20::approveCall::abi_decode(data)
        .map_err(|e| ChainError::InvalidTx(format!("not an approve call: {}", e)))?;
    Ok((call.spender, call.value))
}

pub(crate) fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub(crate) fn decode_allowance(data: &[u8]) -> Result<U256, ChainError> {
    IERC20::allowanceCall::abi_decode_returns(data)
        .map_err(|e| ChainError::InvalidTx(format!("bad allowance return: {}", e)))
}

pub(crate) fn encode_balance_of(owner: Address) -> Bytes {
    IERC20::balanceOfCall { owner }.abi_encode().into()
}

pub(crate) fn decode_balance_of(data: &[u8]) -> Result<U256, ChainError> {
    IERC20::balanceOfCall::abi_decode_returns(data)
        .map_err(|e| ChainError::InvalidTx(format!("bad balanceOf return: {}", e)))
}

pub(crate) fn encode_decimals() -> Bytes {
    IERC20::decimalsCall {}.abi_encode().into()
}

pub(crate) fn decode_decimals(data: &[u8]) -> Result<u8, ChainError> {
    IERC20::decimalsCall::abi_decode_returns(data)
        .map_err(|e| ChainError::InvalidTx(format!("bad decimals return: {}", e)))
}
