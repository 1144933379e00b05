//! alloy-backed [`ChainClient`] for a single wallet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::dyn_abi::TypedData;
use alloy::eips::BlockNumberOrTag;
use alloy::eips::eip2718::Encodable2718;
use alloy::hex;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::TransportError;
use alloy::transports::http::Http;
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::erc20;
use crate::{
    Chain, ChainClient, ChainConfig, ChainError, ChainTable, GasParameters, TokenAmount,
    TransactionError, TxDescriptor, compute_gas,
};

const GWEI: f64 = 1e9;

/// Chain access for one wallet, optionally through a proxy route.
///
/// Providers are created lazily, one per chain, from a random endpoint of the
/// shared table and reused for the life of the client.
pub struct EvmChain {
    signer: PrivateKeySigner,
    wallet: EthereumWallet,
    table: Arc<ChainTable>,
    config: ChainConfig,
    http: reqwest::Client,
    providers: Mutex<HashMap<Chain, RootProvider>>,
}

impl EvmChain {
    pub fn new(
        private_key: &str,
        table: Arc<ChainTable>,
        config: ChainConfig,
        route: Option<&str>,
    ) -> Result<Self, ChainError> {
        let signer = private_key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30));
        if let Some(proxy) = route.and_then(proxy_url) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            wallet: EthereumWallet::from(signer.clone()),
            signer,
            table,
            config,
            http: builder.build()?,
            providers: Mutex::new(HashMap::new()),
        })
    }

    async fn provider(&self, chain: Chain) -> Result<RootProvider, ChainError> {
        let mut providers = self.providers.lock().await;
        if let Some(provider) = providers.get(&chain) {
            return Ok(provider.clone());
        }

        let endpoint = self.table.pick(chain)?;
        let url = endpoint
            .parse::<reqwest::Url>()
            .map_err(|e| ChainError::BadEndpoint {
                url: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        debug!(%chain, endpoint, "connecting provider");

        let transport = Http::with_client(self.http.clone(), url);
        let provider = RootProvider::new(RpcClient::new(transport, false));
        providers.insert(chain, provider.clone());
        Ok(provider)
    }

    fn poll_backoff(&self, limit: Duration) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.poll_interval)
            .with_multiplier(1.5)
            .with_randomization_factor(0.1)
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(Some(limit))
            .build()
    }
}

/// Normalize a wallet route into a proxy URL.
///
/// Routes are stored as `user:pass@host:port`, with or without a scheme. Blank
/// routes and the `log:pass@ip:port` placeholder mean a direct connection.
pub fn proxy_url(route: &str) -> Option<String> {
    let route = route.trim();
    let bare = route
        .strip_prefix("https://")
        .or_else(|| route.strip_prefix("http://"))
        .unwrap_or(route);
    if bare.is_empty() || bare == "log:pass@ip:port" {
        return None;
    }
    Some(format!("http://{bare}"))
}

/// Wrap an RPC failure during submission with whatever the node told us.
fn submission_error(context: &str, error: &TransportError, encoded_tx: &str) -> TransactionError {
    let (message, code) = match error.as_error_resp() {
        Some(payload) => (payload.message.to_string(), payload.code.to_string()),
        None => (error.to_string(), "unknown".to_string()),
    };
    TransactionError {
        message: format!("{}: {}", context, message),
        code,
        encoded_tx: encoded_tx.to_string(),
    }
}

#[async_trait]
impl ChainClient for EvmChain {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn native_balance(&self, chain: Chain) -> Result<U256, ChainError> {
        let provider = self.provider(chain).await?;
        Ok(provider.get_balance(self.address()).await?)
    }

    async fn token_balance(&self, chain: Chain, token: Address) -> Result<TokenAmount, ChainError> {
        let provider = self.provider(chain).await?;

        let balance_call = TransactionRequest::default()
            .with_to(token)
            .with_input(erc20::encode_balance_of(self.address()));
        let raw = erc20::decode_balance_of(&provider.call(balance_call).await?)?;

        let decimals_call = TransactionRequest::default()
            .with_to(token)
            .with_input(erc20::encode_decimals());
        let decimals = erc20::decode_decimals(&provider.call(decimals_call).await?)?;

        Ok(TokenAmount { raw, decimals })
    }

    async fn gas_parameters(&self, chain: Chain) -> Result<GasParameters, ChainError> {
        let provider = self.provider(chain).await?;

        let block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| ChainError::UnexpectedResponse("latest block missing".to_string()))?;
        let gas_price = provider.get_gas_price().await?;
        let priority_fee = provider.get_max_priority_fee_per_gas().await?;

        Ok(compute_gas(
            block.header.base_fee_per_gas,
            gas_price,
            block.header.gas_used,
            block.header.gas_limit,
            priority_fee,
            self.config.gwei_multiplier,
        ))
    }

    #[tracing::instrument(skip(self, tx), fields(address = %self.address(), to = %tx.to))]
    async fn submit(&self, chain: Chain, tx: TxDescriptor) -> Result<B256, ChainError> {
        let provider = self.provider(chain).await?;
        let from = self.address();

        let nonce = provider
            .get_transaction_count(from)
            .await
            .map_err(|e| submission_error("nonce lookup failed", &e, ""))?;
        let gas = self.gas_parameters(chain).await?;

        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(tx.to)
            .with_input(tx.data)
            .with_value(tx.value)
            .with_chain_id(chain.id())
            .with_nonce(nonce)
            .with_max_priority_fee_per_gas(gas.max_priority_fee_per_gas)
            .with_max_fee_per_gas(gas.max_fee_per_gas);

        let gas_limit = match tx.gas {
            Some(limit) => limit,
            None => provider
                .estimate_gas(request.clone())
                .await
                .map_err(|e| submission_error("gas estimation failed", &e, ""))?,
        };

        let envelope = request
            .with_gas_limit(gas_limit)
            .build(&self.wallet)
            .await
            .map_err(|e| TransactionError {
                message: format!("signing failed: {}", e),
                code: "local".to_string(),
                encoded_tx: String::new(),
            })?;
        let encoded = envelope.encoded_2718();
        let encoded_hex = hex::encode_prefixed(&encoded);

        let pending = provider
            .send_raw_transaction(&encoded)
            .await
            .map_err(|e| submission_error("broadcast failed", &e, &encoded_hex))?;
        let hash = *pending.tx_hash();

        info!(%chain, %hash, nonce, gas_limit, "transaction sent");
        Ok(hash)
    }

    async fn await_confirmation(&self, chain: Chain, hash: B256) -> Result<B256, ChainError> {
        let provider = self.provider(chain).await?;
        let mut backoff = self.poll_backoff(self.config.receipt_timeout);

        loop {
            if let Some(receipt) = provider.get_transaction_receipt(hash).await? {
                let link = self.explorer_link(chain, hash);
                if receipt.status() {
                    debug!(%chain, %hash, "transaction confirmed");
                    return Ok(hash);
                }
                warn!(%chain, %hash, "transaction reverted");
                return Err(ChainError::Reverted { link });
            }

            match backoff.next_backoff() {
                Some(delay) => sleep(delay).await,
                None => {
                    return Err(ChainError::ReceiptTimeout {
                        hash: hash.to_string(),
                        secs: self.config.receipt_timeout.as_secs(),
                    });
                }
            }
        }
    }

    #[tracing::instrument(skip(self, value), fields(address = %self.address()))]
    async fn approve(
        &self,
        chain: Chain,
        token: Address,
        spender: Address,
        value: U256,
        force: bool,
    ) -> Result<Option<B256>, ChainError> {
        if !force {
            let provider = self.provider(chain).await?;
            let call = TransactionRequest::default()
                .with_to(token)
                .with_input(erc20::encode_allowance(self.address(), spender));
            let allowance = erc20::decode_allowance(&provider.call(call).await?)?;
            if allowance >= value {
                debug!(%allowance, "allowance already sufficient");
                return Ok(None);
            }
        }

        let hash = self
            .submit(
                chain,
                TxDescriptor {
                    to: token,
                    data: erc20::encode_approve(spender, value),
                    value: U256::ZERO,
                    gas: None,
                },
            )
            .await?;
        self.await_confirmation(chain, hash).await?;

        info!(%hash, "approval confirmed");
        Ok(Some(hash))
    }

    async fn await_balance_change(
        &self,
        chain: Chain,
        baseline: U256,
        only_increase: bool,
    ) -> Result<U256, ChainError> {
        let mut backoff = self.poll_backoff(self.config.balance_timeout);

        loop {
            let balance = self.native_balance(chain).await?;
            let moved = if only_increase {
                balance > baseline
            } else {
                balance != baseline
            };
            if moved {
                debug!(%chain, %baseline, %balance, "balance changed");
                return Ok(balance);
            }

            match backoff.next_backoff() {
                Some(delay) => sleep(delay).await,
                None => {
                    return Err(ChainError::BalanceTimeout {
                        chain: chain.to_string(),
                        secs: self.config.balance_timeout.as_secs(),
                    });
                }
            }
        }
    }

    async fn sign_message(&self, message: &str) -> Result<String, ChainError> {
        let signature = self
            .signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<String, ChainError> {
        let hash = typed
            .eip712_signing_hash()
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }

    async fn wait_for_gwei(&self) -> Result<(), ChainError> {
        let provider = self.provider(Chain::Ethereum).await?;
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(5))
            .with_multiplier(5.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(125))
            .with_max_elapsed_time(Some(self.config.gas_wait))
            .build();

        loop {
            let gwei = provider.get_gas_price().await? as f64 / GWEI;
            if gwei <= self.config.eth_max_gwei {
                return Ok(());
            }

            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(
                        gwei = %format!("{:.2}", gwei),
                        max_gwei = self.config.eth_max_gwei,
                        wait_secs = delay.as_secs(),
                        "gas too high"
                    );
                    sleep(delay).await;
                }
                None => {
                    return Err(ChainError::GasTimeout {
                        max_gwei: self.config.eth_max_gwei,
                    });
                }
            }
        }
    }

    fn explorer_link(&self, chain: Chain, hash: B256) -> String {
        self.table.explorer_link(chain, hash)
    }
}
