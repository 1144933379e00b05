//! Supported chains and the endpoint table.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::ChainError;

/// A chain drover can transact on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Base,
    Arbitrum,
    Optimism,
    Linea,
}

impl Chain {
    pub const ALL: [Chain; 5] = [
        Chain::Ethereum,
        Chain::Base,
        Chain::Arbitrum,
        Chain::Optimism,
        Chain::Linea,
    ];

    pub fn id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Base => 8453,
            Chain::Arbitrum => 42161,
            Chain::Optimism => 10,
            Chain::Linea => 59144,
        }
    }

    pub fn from_id(id: u64) -> Option<Chain> {
        Chain::ALL.into_iter().find(|c| c.id() == id)
    }

    /// Lowercase key used in settings and job context.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Linea => "linea",
        }
    }

    /// Human-readable name, as used in prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "Ethereum",
            Chain::Base => "Base",
            Chain::Arbitrum => "Arbitrum",
            Chain::Optimism => "Optimism",
            Chain::Linea => "Linea",
        }
    }

    pub fn explorer(&self) -> &'static str {
        match self {
            Chain::Ethereum => "https://etherscan.io",
            Chain::Base => "https://basescan.org",
            Chain::Arbitrum => "https://arbiscan.io",
            Chain::Optimism => "https://optimistic.etherscan.io",
            Chain::Linea => "https://lineascan.build",
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ChainError::UnknownChain(s.to_string()))
    }
}

/// RPC endpoints per chain. Built once at startup, never mutated.
#[derive(Debug, Clone, Default)]
pub struct ChainTable {
    rpcs: HashMap<Chain, Vec<String>>,
}

impl ChainTable {
    pub fn new(rpcs: HashMap<Chain, Vec<String>>) -> Self {
        let rpcs = rpcs
            .into_iter()
            .map(|(chain, urls)| {
                let urls: Vec<String> = urls
                    .into_iter()
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .collect();
                (chain, urls)
            })
            .collect();
        Self { rpcs }
    }

    /// Same endpoint list for every chain. Handy for local nodes and tests.
    pub fn single(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(
            Chain::ALL
                .into_iter()
                .map(|c| (c, vec![url.clone()]))
                .collect(),
        )
    }

    pub fn endpoints(&self, chain: Chain) -> &[String] {
        self.rpcs.get(&chain).map(Vec::as_slice).unwrap_or_default()
    }

    /// A random endpoint for `chain`.
    pub fn pick(&self, chain: Chain) -> Result<&str, ChainError> {
        self.endpoints(chain)
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .ok_or_else(|| ChainError::NoEndpoints(chain.to_string()))
    }

    pub fn explorer_link(&self, chain: Chain, hash: impl std::fmt::Display) -> String {
        format!("{}/tx/{}", chain.explorer(), hash)
    }
}

/// Gas and wait policy shared by every wallet's client.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Applied to `max(base fee, gas price)`.
    pub gwei_multiplier: f64,
    /// Mainnet gas ceiling, in gwei, before a job may start.
    pub eth_max_gwei: f64,
    /// How long to wait for mainnet gas to drop below the ceiling.
    pub gas_wait: Duration,
    pub receipt_timeout: Duration,
    pub balance_timeout: Duration,
    /// First interval between receipt and balance polls.
    pub poll_interval: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            gwei_multiplier: 1.05,
            eth_max_gwei: 2.0,
            gas_wait: Duration::from_secs(30 * 60),
            receipt_timeout: Duration::from_secs(5 * 60),
            balance_timeout: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_secs(2),
        }
    }
}
