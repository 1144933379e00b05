//! Shared fixtures: an in-memory chain and a scripted remote service.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use drover_chain::{
    Address, B256, Chain, ChainClient, ChainError, GasParameters, TokenAmount, TxDescriptor,
    TypedData, U256,
};
use drover_pipeline::{PipelineConfig, PromptBook, RetryPolicy, SwapPlan};
use drover_queue::{Claim, ClaimedJob, JobPlan, Store, StoreOptions, Vault};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const ADDRESS: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const ROUTER: &str = "0x6Cb442acF35158D5eDa88fe602221b67B400Be3E";

pub const CREATE_SWAP: &str = "a831b0e504b3ba6cff855dc044e7b68692282af7";
pub const GET_SWAP_DATA: &str = "fa538a090030a8a9e2a5fca2171f22dd1891f8be";
pub const SEND_TX: &str = "4595dcc7970106ab7b07f377d4ac56c9e37d4067";
pub const SIGNED_MESSAGE: &str = "9c7a4279b05b2de05c8b7d0a7f3a7fe717f202dc";

#[derive(Default)]
struct ChainState {
    submits: Vec<(Chain, TxDescriptor)>,
    approvals: Vec<(Address, Address, U256)>,
    allowances: HashMap<(Address, Address), U256>,
    native: HashMap<Chain, U256>,
    tokens: HashMap<Address, TokenAmount>,
    typed_signatures: usize,
}

/// A wallet on a chain that confirms everything instantly.
pub struct MockChain {
    address: Address,
    state: Mutex<ChainState>,
    /// Added to the baseline whenever a balance change is awaited.
    pub arrival: U256,
    pub revert: bool,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            address: Address::from_str(ADDRESS).unwrap(),
            state: Mutex::default(),
            arrival: U256::from(1_000_000_000_000_000u64),
            revert: false,
        }
    }

    pub fn reverting() -> Self {
        Self {
            revert: true,
            ..Self::new()
        }
    }

    pub fn with_token(self, token: Address, amount: TokenAmount) -> Self {
        self.state.lock().unwrap().tokens.insert(token, amount);
        self
    }

    pub fn with_native(self, chain: Chain, wei: U256) -> Self {
        self.state.lock().unwrap().native.insert(chain, wei);
        self
    }

    pub fn submits(&self) -> Vec<(Chain, TxDescriptor)> {
        self.state.lock().unwrap().submits.clone()
    }

    pub fn approvals(&self) -> Vec<(Address, Address, U256)> {
        self.state.lock().unwrap().approvals.clone()
    }

    pub fn typed_signatures(&self) -> usize {
        self.state.lock().unwrap().typed_signatures
    }

    fn next_hash(state: &ChainState) -> B256 {
        B256::with_last_byte((state.submits.len() + state.approvals.len() + 1) as u8)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn address(&self) -> Address {
        self.address
    }

    async fn native_balance(&self, chain: Chain) -> Result<U256, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .native
            .get(&chain)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn token_balance(&self, _chain: Chain, token: Address) -> Result<TokenAmount, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tokens
            .get(&token)
            .copied()
            .unwrap_or(TokenAmount {
                raw: U256::ZERO,
                decimals: 18,
            }))
    }

    async fn gas_parameters(&self, _chain: Chain) -> Result<GasParameters, ChainError> {
        Ok(GasParameters {
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000,
        })
    }

    async fn submit(&self, chain: Chain, tx: TxDescriptor) -> Result<B256, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.submits.push((chain, tx));
        Ok(Self::next_hash(&state))
    }

    async fn await_confirmation(&self, chain: Chain, hash: B256) -> Result<B256, ChainError> {
        if self.revert {
            return Err(ChainError::Reverted {
                link: format!("{}/tx/{hash}", chain.explorer()),
            });
        }
        Ok(hash)
    }

    async fn approve(
        &self,
        _chain: Chain,
        token: Address,
        spender: Address,
        value: U256,
        force: bool,
    ) -> Result<Option<B256>, ChainError> {
        let mut state = self.state.lock().unwrap();
        let current = state
            .allowances
            .get(&(token, spender))
            .copied()
            .unwrap_or(U256::ZERO);
        if !force && current >= value {
            return Ok(None);
        }
        state.allowances.insert((token, spender), value);
        state.approvals.push((token, spender, value));
        Ok(Some(Self::next_hash(&state)))
    }

    async fn await_balance_change(
        &self,
        chain: Chain,
        baseline: U256,
        _only_increase: bool,
    ) -> Result<U256, ChainError> {
        let updated = baseline + self.arrival;
        self.state.lock().unwrap().native.insert(chain, updated);
        Ok(updated)
    }

    async fn sign_message(&self, _message: &str) -> Result<String, ChainError> {
        Ok("0xsigned".to_string())
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<String, ChainError> {
        typed
            .eip712_signing_hash()
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        self.state.lock().unwrap().typed_signatures += 1;
        Ok("0xtyped".to_string())
    }

    async fn wait_for_gwei(&self) -> Result<(), ChainError> {
        Ok(())
    }

    fn explorer_link(&self, chain: Chain, hash: B256) -> String {
        format!("{}/tx/{hash}", chain.explorer())
    }
}

/// A store holding one wallet with the given plan, and that wallet's claimed job.
pub async fn store_with_job(plan: JobPlan) -> (TempDir, Arc<Store>, ClaimedJob) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path(), StoreOptions::default()).await.unwrap();
    store
        .create(&Vault::from_passphrase("flow"), &[KEY.to_string()], &[], &plan)
        .await
        .unwrap();
    let claimed = claim(&store).await;
    (dir, Arc::new(store), claimed)
}

pub async fn claim(store: &Store) -> ClaimedJob {
    match store.claim_random(&HashSet::new()).await.unwrap() {
        Claim::Job(job) => job,
        Claim::Exhausted => panic!("store has no runnable job"),
    }
}

pub fn swap_plan() -> JobPlan {
    JobPlan {
        swap_times: 1..=1,
        bridge_times: 0..=0,
    }
}

pub fn bridge_plan() -> JobPlan {
    JobPlan {
        swap_times: 0..=0,
        bridge_times: 1..=1,
    }
}

pub fn config() -> PipelineConfig {
    let mut tokens = HashMap::new();
    tokens.insert("USDC".to_string(), Address::from_str(USDC).unwrap());
    PipelineConfig {
        swap: SwapPlan {
            tokens: vec!["USDC".to_string()],
            eth_usd: 2.0..=2.0,
            back_swap: 100.0..=100.0,
        },
        tokens,
        poll_interval: Duration::from_millis(5),
        max_polls: 10,
        retry: RetryPolicy {
            sleep: Duration::from_millis(5),
            ..RetryPolicy::default()
        },
        ..PipelineConfig::default()
    }
}

pub fn prompts() -> PromptBook {
    PromptBook {
        swap: vec![
            "swap {usd_amount}$ of {from_token} to {to_token} on {chain_name}".to_string(),
            "swap {token_amount} {from_token} to {to_token} on {chain_name}".to_string(),
        ],
        bridge: vec![
            "bridge {usd_amount}$ from {from_chain} to {to_chain}".to_string(),
            "bridge {token_amount} ETH from {from_chain} to {to_chain}".to_string(),
        ],
    }
}

/// One line of the position-tagged stream.
pub fn line(tag: &str, payload: &Value) -> String {
    format!("{tag}:{payload}\n")
}

/// An assistant reply carrying the route tool call.
pub fn tool_reply() -> String {
    let mut body = line("f", &json!({"messageId": "msg-1"}));
    body += &line("0", &json!("Here is the best route I found."));
    body += &line("f", &json!({"messageId": "msg-2"}));
    body += &line(
        "9",
        &json!({"toolCallId": "call-1", "toolName": "show_swap_or_bridge_ui", "args": {}}),
    );
    body += &line(
        "a",
        &json!({
            "toolCallId": "call-1",
            "result": {
                "amount": "0.001",
                "fromToken": "ETH",
                "fromChain": "base",
                "toToken": "USDC",
                "toChain": "base",
                "fromAddress": ADDRESS,
                "toAddress": ADDRESS,
                "slippage": 0.5,
                "provider": "relay",
                "bundledExecution": false
            }
        }),
    );
    body += &line("d", &json!({"finishReason": "stop"}));
    body
}

/// A text-only reply with the given suggestion buttons.
pub fn text_reply(buttons: &[&str]) -> String {
    let suggestions: String = buttons
        .iter()
        .map(|b| format!(" :suggestion[{b}]"))
        .collect();
    let mut body = line("f", &json!({"messageId": "msg-q"}));
    body += &line("0", &json!(format!("Do you want to continue?{suggestions}")));
    body
}

/// A swap-data poll body whose first segment holds `actions`.
pub fn poll_body(actions: Value) -> String {
    format!("0:[\"$@1\"]\n{}", line("1", &json!({"status": 200, "data": actions})))
}

pub fn approve_action(spender: Address, value: U256) -> Value {
    json!({
        "action_type": "approve",
        "task_id": "task-approve",
        "status": "sign_pending",
        "evm_tx_data": {
            "to": USDC,
            "data": drover_chain::encode_approve(spender, value).to_string(),
            "gas": "0xea60",
            "value": "0x0",
            "chain_id": "0x2105"
        }
    })
}

/// A signature-only order on `from_chain`.
pub fn typed_order_action(from_chain: &str) -> Value {
    json!({
        "action_type": "swap",
        "task_id": "task-sig",
        "short_description": "Swap 0.001 ETH to USDC",
        "estimate": {"from_chain": from_chain},
        "evm_typed_data": {
            "domain": {
                "name": "Permit2",
                "chainId": 8453,
                "verifyingContract": "0x000000000022D473030F116dDEE9F6B43aC78BA3"
            },
            "primaryType": "Order",
            "types": {"Order": [{"name": "amount", "type": "uint256"}]},
            "message": {"amount": "1000"}
        }
    })
}

pub fn swap_tx_action(chain_id: &str) -> Value {
    json!({
        "action_type": "swap",
        "task_id": "task-swap",
        "status": "sign_pending",
        "short_description": "Swap 0.001 ETH to USDC",
        "evm_tx_data": {
            "to": ROUTER,
            "data": "0xdeadbeef",
            "gas": "0x30d40",
            "value": "0x38d7ea4c68000",
            "chain_id": chain_id
        }
    })
}

/// Mount the sign-in, account and pipeline-creation endpoints.
pub async fn mount_session(server: &MockServer, referral_code: Option<&str>) {
    Mock::given(method("POST"))
        .and(path("/api/siwe_verification"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Signature validation successful"
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "referral_code": referral_code,
            "points_v2": 1250,
            "rank_v2": 8042
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/quests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"progress_completed": 1, "progress_total": 1},
            {"progress_completed": 0, "progress_total": 2}
        ])))
        .mount(server)
        .await;
}

pub async fn mount_pipeline(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/pipeline"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"action_type": "swap", "estimate": {"id": "est-1"}}
        ])))
        .mount(server)
        .await;
    mount_action(
        server,
        CREATE_SWAP,
        line("1", &json!({"status": 200, "data": {"pipeline_id": "pipe-1"}})),
    )
    .await;
    mount_action(server, SEND_TX, "0:null\n".to_string()).await;
    mount_action(server, SIGNED_MESSAGE, "0:null\n".to_string()).await;
}

pub async fn mount_chat(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_action(server: &MockServer, action: &str, body: String) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/chat/[0-9a-f-]+$"))
        .and(header("Next-Action", action))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Requests the server saw for a server action.
pub async fn action_requests(server: &MockServer, action: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| {
            r.headers
                .get("Next-Action")
                .and_then(|v| v.to_str().ok())
                == Some(action)
        })
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}
