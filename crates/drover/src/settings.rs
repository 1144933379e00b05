//! Run settings, loaded from a JSON file.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! [`Settings::validate`] runs before any work starts and the `*_config`
//! helpers turn the flat file into the typed configs of each crate.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use drover_chain::{Address, Chain, ChainConfig, ChainTable};
use drover_pipeline::{BridgePlan, PipelineConfig, RetryPolicy, SwapPlan};
use drover_queue::{HoldThresholds, JobPlan, StoreOptions};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AppError;

const DEFAULT_SERVICE_URL: &str = "https://app.heyelsa.ai";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Pick jobs from random wallets instead of in store order.
    pub shuffle_wallets: bool,
    /// Attempts for every retried remote operation.
    pub retry: u32,
    /// Mainnet gas ceiling in gwei; jobs wait until gas drops below it.
    pub eth_max_gwei: f64,
    pub gwei_multiplier: f64,
    /// Minutes to wait for a receipt before a transaction counts as failed.
    pub to_wait_tx: u64,
    /// RPC endpoints keyed by lowercase chain name.
    pub rpcs: BTreeMap<String, Vec<String>>,
    /// Percent chance that a new account registers with a referral code.
    pub use_ref_chance: u8,
    pub swap: SwapSettings,
    pub bridge: BridgeSettings,
    /// Seconds a worker sleeps after each job.
    pub sleep_after_account: [u64; 2],
    /// Wallets processed at the same time.
    pub threads: usize,
    pub telegram: TelegramSettings,
    pub service_url: String,
    /// Country code announced to the assistant.
    pub country_code: String,
    /// Token addresses on Base, by symbol.
    pub token_addresses: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapSettings {
    pub tokens: Vec<String>,
    /// Round trips (ETH -> token -> ETH) per wallet.
    pub swap_times: [u32; 2],
    /// USD worth of ETH spent on an opening swap.
    pub swap_eth_usd: [f64; 2],
    /// Percent of the token balance sold back.
    pub back_swap: [f64; 2],
    /// Tokens a wallet may hold before it must sell one.
    pub max_token_hold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Round trips (Base -> chain -> Base) per wallet.
    pub bridge_times: [u32; 2],
    pub bridge_eth_usd: [f64; 2],
    pub to_chains: Vec<Chain>,
    /// Open bridges a wallet may have before it must bridge back.
    pub max_chains_hold: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    /// Bot token; empty disables notifications.
    pub bot_token: String,
    pub user_ids: Vec<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shuffle_wallets: true,
            retry: 3,
            eth_max_gwei: 2.0,
            gwei_multiplier: 1.05,
            to_wait_tx: 1,
            rpcs: default_rpcs(),
            use_ref_chance: 80,
            swap: SwapSettings::default(),
            bridge: BridgeSettings::default(),
            sleep_after_account: [50, 100],
            threads: 1,
            telegram: TelegramSettings::default(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
            country_code: "US".to_string(),
            token_addresses: default_token_addresses(),
        }
    }
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            tokens: ["USDC", "wstETH", "USDe", "DAI", "CRV", "AERO", "AAVE"]
                .into_iter()
                .map(String::from)
                .collect(),
            swap_times: [1, 2],
            swap_eth_usd: [4.0, 8.0],
            back_swap: [100.0, 100.0],
            max_token_hold: 1,
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            bridge_times: [0, 0],
            bridge_eth_usd: [2.0, 4.0],
            to_chains: vec![Chain::Arbitrum, Chain::Optimism, Chain::Linea],
            max_chains_hold: 1,
        }
    }
}

fn default_rpcs() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 5] = [
        (
            "ethereum",
            &[
                "https://rpc.flashbots.net/fast",
                "https://eth.rpc.blxrbdn.com",
                "https://1rpc.io/eth",
                "https://eth.drpc.org",
                "https://ethereum-rpc.publicnode.com",
            ],
        ),
        (
            "base",
            &[
                "https://1rpc.io/base",
                "https://mainnet.base.org",
                "https://0xrpc.io/base",
                "https://base-mainnet.public.blastapi.io",
            ],
        ),
        (
            "arbitrum",
            &[
                "https://arb1.arbitrum.io/rpc",
                "https://arb-pokt.nodies.app",
                "https://arbitrum.drpc.org",
            ],
        ),
        (
            "optimism",
            &[
                "https://1rpc.io/op",
                "https://mainnet.optimism.io",
                "https://0xrpc.io/op",
            ],
        ),
        (
            "linea",
            &[
                "https://1rpc.io/linea",
                "https://linea.therpc.io",
                "https://rpc.linea.build",
            ],
        ),
    ];
    table
        .into_iter()
        .map(|(chain, urls)| {
            (
                chain.to_string(),
                urls.iter().map(|u| u.to_string()).collect(),
            )
        })
        .collect()
}

fn default_token_addresses() -> BTreeMap<String, String> {
    [
        ("USDC", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        ("DAI", "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb"),
        ("wstETH", "0xc1CBa3fCea344f92D9239c08C0568f6F2F0ee452"),
        ("AERO", "0x940181a94A35A4569E4529A3CDfB74e38FD98631"),
        ("USDe", "0x5d3a1Ff2b6BAb83b63cd9AD0787074081a52ef34"),
        ("CRV", "0x8Ee73c484A26e0A5df2Ee2a4960B789967dd0415"),
        ("AAVE", "0x63706e401c06ac8513145b7687A14804d17f814b"),
    ]
    .into_iter()
    .map(|(symbol, address)| (symbol.to_string(), address.to_string()))
    .collect()
}

impl Settings {
    /// Read settings from `path`, falling back to defaults when it does not exist.
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(AppError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let settings: Self = serde_json::from_str(&raw).map_err(|source| AppError::Settings {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints the types cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.threads == 0 {
            return Err(config("threads must be at least 1"));
        }
        if self.retry == 0 {
            return Err(config("retry must be at least 1"));
        }
        if self.use_ref_chance > 100 {
            return Err(config(format!(
                "use_ref_chance must be a percentage, got {}",
                self.use_ref_chance
            )));
        }
        if !(self.gwei_multiplier.is_finite() && self.gwei_multiplier >= 1.0) {
            return Err(config(format!(
                "gwei_multiplier must be at least 1, got {}",
                self.gwei_multiplier
            )));
        }
        if !(self.eth_max_gwei.is_finite() && self.eth_max_gwei > 0.0) {
            return Err(config(format!(
                "eth_max_gwei must be positive, got {}",
                self.eth_max_gwei
            )));
        }

        ordered("sleep_after_account", self.sleep_after_account)?;
        ordered("swap.swap_times", self.swap.swap_times)?;
        ordered("bridge.bridge_times", self.bridge.bridge_times)?;
        amounts("swap.swap_eth_usd", self.swap.swap_eth_usd)?;
        amounts("swap.back_swap", self.swap.back_swap)?;
        amounts("bridge.bridge_eth_usd", self.bridge.bridge_eth_usd)?;
        if self.swap.back_swap[1] > 100.0 {
            return Err(config("swap.back_swap cannot exceed 100 percent"));
        }
        if self.swap.max_token_hold == 0 || self.bridge.max_chains_hold == 0 {
            return Err(config("hold limits must be at least 1"));
        }

        if self.swap.swap_times[1] > 0 {
            if self.swap.tokens.is_empty() {
                return Err(config("swap.tokens is empty but swaps are planned"));
            }
            for token in &self.swap.tokens {
                if !self.token_addresses.contains_key(token) {
                    return Err(config(format!("no address configured for token {token}")));
                }
            }
        }
        if self.bridge.bridge_times[1] > 0 {
            if self.bridge.to_chains.is_empty() {
                return Err(config("bridge.to_chains is empty but bridges are planned"));
            }
            if self.bridge.to_chains.contains(&Chain::Base) {
                return Err(config("bridge.to_chains cannot include base"));
            }
        }

        self.tokens()?;
        self.chain_table()?;
        reqwest::Url::parse(&self.service_url)
            .map_err(|e| config(format!("service_url {}: {e}", self.service_url)))?;

        if !self.telegram.bot_token.is_empty() && self.telegram.user_ids.is_empty() {
            warn!("telegram bot token set without user ids, notifications go nowhere");
        }
        Ok(())
    }

    pub fn job_plan(&self) -> JobPlan {
        JobPlan {
            swap_times: self.swap.swap_times[0]..=self.swap.swap_times[1],
            bridge_times: self.bridge.bridge_times[0]..=self.bridge.bridge_times[1],
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            hold: HoldThresholds {
                swap: self.swap.max_token_hold,
                bridge: self.bridge.max_chains_hold,
            },
            shuffle: self.shuffle_wallets,
            referral_chance: self.use_ref_chance,
        }
    }

    pub fn chain_table(&self) -> Result<ChainTable, AppError> {
        let mut rpcs = HashMap::new();
        for (name, urls) in &self.rpcs {
            let chain = Chain::from_str(name)?;
            rpcs.insert(chain, urls.clone());
        }

        let table = ChainTable::new(rpcs);
        for chain in self.required_chains() {
            if table.endpoints(chain).is_empty() {
                return Err(config(format!("no rpc endpoints for {chain}")));
            }
        }
        Ok(table)
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            gwei_multiplier: self.gwei_multiplier,
            eth_max_gwei: self.eth_max_gwei,
            receipt_timeout: Duration::from_secs(self.to_wait_tx * 60),
            ..ChainConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig, AppError> {
        Ok(PipelineConfig {
            swap: SwapPlan {
                tokens: self.swap.tokens.clone(),
                eth_usd: self.swap.swap_eth_usd[0]..=self.swap.swap_eth_usd[1],
                back_swap: self.swap.back_swap[0]..=self.swap.back_swap[1],
            },
            bridge: BridgePlan {
                to_chains: self.bridge.to_chains.clone(),
                eth_usd: self.bridge.bridge_eth_usd[0]..=self.bridge.bridge_eth_usd[1],
            },
            tokens: self.tokens()?,
            retry: RetryPolicy {
                attempts: self.retry,
                ..RetryPolicy::default()
            },
            ..PipelineConfig::default()
        })
    }

    pub fn cooldown(&self) -> RangeInclusive<Duration> {
        let [min, max] = self.sleep_after_account;
        Duration::from_secs(min)..=Duration::from_secs(max)
    }

    fn tokens(&self) -> Result<HashMap<String, Address>, AppError> {
        self.token_addresses
            .iter()
            .map(|(symbol, address)| {
                let parsed = Address::from_str(address.trim())
                    .map_err(|e| config(format!("token {symbol} address {address}: {e}")))?;
                Ok((symbol.clone(), parsed))
            })
            .collect()
    }

    /// Chains a run touches: mainnet for gas checks, Base, and every bridge target.
    fn required_chains(&self) -> Vec<Chain> {
        let mut chains = vec![Chain::Ethereum, Chain::Base];
        if self.bridge.bridge_times[1] > 0 {
            chains.extend(self.bridge.to_chains.iter().copied());
        }
        chains
    }
}

fn config(message: impl Into<String>) -> AppError {
    AppError::Config(message.into())
}

fn ordered<T: PartialOrd + std::fmt::Debug>(name: &str, [min, max]: [T; 2]) -> Result<(), AppError> {
    if min > max {
        return Err(config(format!("{name}: min {min:?} is above max {max:?}")));
    }
    Ok(())
}

fn amounts(name: &str, range: [f64; 2]) -> Result<(), AppError> {
    if range.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(config(format!("{name} must hold non-negative numbers")));
    }
    ordered(name, range)
}
