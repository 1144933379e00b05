//! Actions returned by the remote pipeline while it prepares a transaction.

use std::str::FromStr;

use drover_chain::{Address, Bytes, Chain, TxDescriptor, TypedData, U256};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::PipelineError;
use crate::stream::{json_segment, segment};

/// Raw EVM transaction fields, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvmTxData {
    pub to: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub chain_id: Option<String>,
}

impl EvmTxData {
    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id.as_deref().and_then(|id| parse_hex_u64(id).ok())
    }

    pub fn calldata(&self) -> Result<Bytes, PipelineError> {
        Bytes::from_str(&self.data)
            .map_err(|e| PipelineError::Protocol(format!("bad calldata {:?}: {e}", self.data)))
    }
}

/// One sub-action of a pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SwapAction {
    pub action_type: String,
    #[serde(default)]
    pub task_id: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub estimate: Option<Value>,
    #[serde(default)]
    pub evm_tx_data: Option<EvmTxData>,
    #[serde(default)]
    pub evm_typed_data: Option<Value>,
}

impl SwapAction {
    /// Description used in reports, with its first letter lowercased.
    pub fn label(&self) -> String {
        let description = self.short_description.as_deref().unwrap_or(&self.action_type);
        let mut chars = description.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// The chain the action executes on.
    pub fn chain(&self, fallback: Chain) -> Chain {
        let from_tx = self
            .evm_tx_data
            .as_ref()
            .and_then(EvmTxData::chain_id)
            .and_then(Chain::from_id);
        let from_estimate = || {
            let value = self.estimate.as_ref()?.get("from_chain")?;
            match value {
                Value::String(name) => Chain::from_str(name)
                    .ok()
                    .or_else(|| parse_hex_u64(name).ok().and_then(Chain::from_id))
                    .or_else(|| name.parse().ok().and_then(Chain::from_id)),
                Value::Number(id) => id.as_u64().and_then(Chain::from_id),
                _ => None,
            }
        };
        from_tx.or_else(from_estimate).unwrap_or(fallback)
    }

    /// Typed data to sign, with the EIP-712 domain type declared.
    pub fn typed_data(&self) -> Result<TypedData, PipelineError> {
        let typed = self
            .evm_typed_data
            .as_ref()
            .ok_or_else(|| PipelineError::Protocol("action has no typed data".into()))?;

        let mut types = serde_json::Map::new();
        types.insert(
            "EIP712Domain".into(),
            json!([
                {"name": "name", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"},
            ]),
        );
        if let Some(Value::Object(declared)) = typed.get("types") {
            types.extend(declared.clone());
        }

        let document = json!({
            "domain": typed.get("domain").cloned().unwrap_or(Value::Null),
            "message": typed.get("message").cloned().unwrap_or(Value::Null),
            "primaryType": typed.get("primaryType").cloned().unwrap_or(Value::Null),
            "types": types,
        });
        serde_json::from_value(document)
            .map_err(|e| PipelineError::Protocol(format!("bad typed data: {e}")))
    }

    /// The executable transaction. `raw_data`, when non-empty, overrides the calldata.
    pub fn tx_descriptor(&self, raw_data: &str) -> Result<TxDescriptor, PipelineError> {
        let evm = self
            .evm_tx_data
            .as_ref()
            .ok_or_else(|| PipelineError::Protocol("action has no transaction data".into()))?;

        let to = Address::from_str(&evm.to)
            .map_err(|e| PipelineError::Protocol(format!("bad target {:?}: {e}", evm.to)))?;
        let data = if raw_data.trim().is_empty() {
            evm.calldata()?
        } else {
            Bytes::from_str(raw_data.trim())
                .map_err(|e| PipelineError::Protocol(format!("bad raw calldata: {e}")))?
        };
        let value = match evm.value.as_deref() {
            Some(v) if !v.is_empty() => U256::from_str(v)
                .map_err(|e| PipelineError::Protocol(format!("bad value {v:?}: {e}")))?,
            _ => U256::ZERO,
        };
        let gas = match evm.gas.as_deref() {
            Some(g) if !g.is_empty() => Some(parse_hex_u64(g)?),
            _ => None,
        };

        Ok(TxDescriptor {
            to,
            data,
            value,
            gas,
        })
    }
}

/// What a swap-data poll returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapData {
    /// A transaction to submit. `raw_data` is empty when the action's own calldata applies.
    TxReady { action: SwapAction, raw_data: String },
    /// Typed data to sign off-chain.
    SignatureNeeded(SwapAction),
    /// An allowance must be granted before the swap can be prepared.
    Approval(SwapAction),
    /// Nothing actionable yet.
    Pending,
}

/// Classify a raw swap-data response, checking the transaction segment first.
pub fn classify_swap_data(body: &str) -> Result<SwapData, PipelineError> {
    if let Some(tx_segment) = segment(body, "2").filter(|s| !s.is_empty()) {
        let rest = tx_segment
            .split_once(',')
            .map(|(_, rest)| rest)
            .unwrap_or(tx_segment);
        let (raw_data, payload) = rest.split_once("1:").ok_or_else(|| {
            PipelineError::Protocol(format!("transaction segment without data: {tx_segment}"))
        })?;
        let response: Value = serde_json::from_str(payload)?;
        let action = find_action(&response, "swap")?.ok_or_else(|| {
            PipelineError::Protocol(format!("failed to get transaction data: {response}"))
        })?;
        return Ok(SwapData::TxReady {
            action,
            raw_data: raw_data.to_string(),
        });
    }

    let Some(response) = json_segment(body, "1")? else {
        return Ok(SwapData::Pending);
    };

    let swap = find_action(&response, "swap")?;
    if let Some(swap) = swap {
        if swap.evm_typed_data.is_some() {
            return Ok(SwapData::SignatureNeeded(swap));
        }
        if swap.evm_tx_data.is_some() {
            return Ok(SwapData::TxReady {
                action: swap,
                raw_data: String::new(),
            });
        }
    }

    match find_action(&response, "approve")? {
        Some(approve) if approve.evm_tx_data.is_some() => Ok(SwapData::Approval(approve)),
        _ => Ok(SwapData::Pending),
    }
}

/// The tracked pipeline id from a create-swap response.
pub fn extract_pipeline_id(body: &str) -> Result<Value, PipelineError> {
    let response = json_segment(body, "1")?.unwrap_or(Value::Null);
    let ok = response.get("status").and_then(Value::as_u64) == Some(200);
    match response.get("data").and_then(|d| d.get("pipeline_id")) {
        Some(id) if ok && !id.is_null() => Ok(id.clone()),
        _ => Err(PipelineError::Protocol(format!(
            "unexpected pipeline id response: {response}"
        ))),
    }
}

/// The estimate id of the swap sub-action from a dry-run response.
pub(crate) fn estimate_id(response: &Value) -> Result<Value, PipelineError> {
    let actions = response
        .as_array()
        .ok_or_else(|| PipelineError::Protocol(format!("unexpected dry run response: {response}")))?;
    actions
        .iter()
        .filter(|a| a.get("action_type").and_then(Value::as_str) == Some("swap"))
        .find_map(|a| a.get("estimate")?.get("id").cloned())
        .ok_or_else(|| PipelineError::Protocol(format!("no swap estimate in: {response}")))
}

fn find_action(response: &Value, action_type: &str) -> Result<Option<SwapAction>, PipelineError> {
    let Some(actions) = response.get("data").and_then(Value::as_array) else {
        return Ok(None);
    };
    actions
        .iter()
        .find(|a| a.get("action_type").and_then(Value::as_str) == Some(action_type))
        .map(|a| serde_json::from_value(a.clone()).map_err(PipelineError::from))
        .transpose()
}

fn parse_hex_u64(s: &str) -> Result<u64, PipelineError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| PipelineError::Protocol(format!("not a hex quantity: {s:?}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| PipelineError::Protocol(format!("bad hex quantity {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn approve_poll() -> String {
        let body = json!({
            "status": 200,
            "data": [{
                "action_type": "approve",
                "task_id": "task-1",
                "status": "sign_pending",
                "evm_tx_data": {
                    "to": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                    "data": "0x095ea7b3",
                    "gas": "0x5208",
                    "value": "0x0",
                    "chain_id": "0x2105"
                }
            }, {"action_type": "swap", "task_id": "task-2"}]
        });
        format!("0:[\"$@1\"]\n1:{body}\n")
    }

    #[test]
    fn test_classify_approval() {
        let SwapData::Approval(action) = classify_swap_data(&approve_poll()).unwrap() else {
            panic!("expected approval");
        };
        assert_eq!(action.status.as_deref(), Some("sign_pending"));
        assert_eq!(action.chain(Chain::Ethereum), Chain::Base);
    }

    #[test]
    fn test_classify_pending_without_segments() {
        assert_eq!(classify_swap_data("0:\"working\"\n").unwrap(), SwapData::Pending);
        let body = format!("1:{}\n", json!({"status": 200, "data": [{"action_type": "swap"}]}));
        assert_eq!(classify_swap_data(&body).unwrap(), SwapData::Pending);
    }

    #[test]
    fn test_classify_transaction_segment_first() {
        let json = json!({"data": [{
            "action_type": "swap",
            "short_description": "Swap 0.001 ETH to USDC",
            "evm_tx_data": {"to": "0x0000000000000000000000000000000000000001", "data": "0x", "gas": "0x30d40", "value": "0x38d7ea4c68000", "chain_id": "0x2105"}
        }]});
        let body = format!("{}2:T1a,0xabcdef1:{json}\n", approve_poll());

        let SwapData::TxReady { action, raw_data } = classify_swap_data(&body).unwrap() else {
            panic!("expected transaction");
        };
        assert_eq!(raw_data, "0xabcdef");
        assert_eq!(action.label(), "swap 0.001 ETH to USDC");

        let tx = action.tx_descriptor(&raw_data).unwrap();
        assert_eq!(tx.data, Bytes::from(vec![0xab, 0xcd, 0xef]));
        assert_eq!(tx.gas, Some(200_000));
        assert_eq!(tx.value, U256::from(1_000_000_000_000_000u64));
    }

    #[test]
    fn test_classify_signature() {
        let body = format!(
            "1:{}\n",
            json!({"data": [{
                "action_type": "swap",
                "task_id": 77,
                "evm_typed_data": {
                    "domain": {"name": "Permit2", "chainId": 8453, "verifyingContract": "0x000000000022D473030F116dDEE9F6B43aC78BA3"},
                    "primaryType": "Order",
                    "types": {"Order": [{"name": "amount", "type": "uint256"}]},
                    "message": {"amount": "5"}
                }
            }]})
        );
        let SwapData::SignatureNeeded(action) = classify_swap_data(&body).unwrap() else {
            panic!("expected signature");
        };
        assert_eq!(action.task_id, Some(json!(77)));

        let typed = action.typed_data().unwrap();
        assert_eq!(typed.primary_type, "Order");
        assert!(typed.eip712_signing_hash().is_ok());
    }

    #[test]
    fn test_extract_pipeline_id() {
        let body = format!("1:{}\n", json!({"status": 200, "data": {"pipeline_id": "p-9"}}));
        assert_eq!(extract_pipeline_id(&body).unwrap(), json!("p-9"));

        let failed = format!("1:{}\n", json!({"status": 500, "data": {"pipeline_id": "p-9"}}));
        assert!(extract_pipeline_id(&failed).is_err());
        let missing = format!("1:{}\n", json!({"status": 200, "data": {"pipeline_id": null}}));
        assert!(extract_pipeline_id(&missing).is_err());
    }

    #[test]
    fn test_estimate_id_from_dry_run() {
        let response = json!([
            {"action_type": "approve", "estimate": {"id": "a"}},
            {"action_type": "swap", "estimate": {"id": "est-1"}}
        ]);
        assert_eq!(estimate_id(&response).unwrap(), json!("est-1"));
        assert!(estimate_id(&json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_chain_from_estimate() {
        let action: SwapAction = serde_json::from_value(json!({
            "action_type": "swap",
            "estimate": {"from_chain": "arbitrum"}
        }))
        .unwrap();
        assert_eq!(action.chain(Chain::Base), Chain::Arbitrum);

        let by_id: SwapAction = serde_json::from_value(json!({
            "action_type": "swap",
            "estimate": {"from_chain": 10}
        }))
        .unwrap();
        assert_eq!(by_id.chain(Chain::Base), Chain::Optimism);
    }
}
