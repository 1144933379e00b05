//! Natural-language request templates.

use std::path::Path;
use std::sync::LazyLock;

use rand::seq::SliceRandom;
use regex::{Captures, Regex};
use tracing::debug;

use crate::PipelineError;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^}]+)\}").unwrap());

const SWAP_FILE: &str = "swap_prompts.txt";
const BRIDGE_FILE: &str = "bridge_prompts.txt";

const DEFAULT_SWAP: &[&str] = &[
    "swap {usd_amount}$ of {from_token} to {to_token} on {chain_name}",
    "I want to swap {usd_amount} USD worth of {from_token} for {to_token} on {chain_name}",
    "swap {token_amount} {from_token} to {to_token} on {chain_name}",
    "please swap {token_amount} {from_token} into {to_token} on {chain_name}",
];

const DEFAULT_BRIDGE: &[&str] = &[
    "bridge {usd_amount}$ of ETH from {from_chain} to {to_chain}",
    "I want to bridge {usd_amount} USD worth of ETH from {from_chain} to {to_chain}",
    "bridge {token_amount} ETH from {from_chain} to {to_chain}",
    "move {token_amount} ETH from {from_chain} to {to_chain}",
];

/// How much to move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    Tokens(f64),
    Usd(f64),
}

impl Amount {
    fn key(&self) -> &'static str {
        match self {
            Amount::Tokens(_) => "token_amount",
            Amount::Usd(_) => "usd_amount",
        }
    }

    fn value(&self) -> f64 {
        match self {
            Amount::Tokens(v) | Amount::Usd(v) => *v,
        }
    }
}

/// A request to render into a prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptRequest {
    Swap {
        amount: Amount,
        from_token: String,
        to_token: String,
        chain_name: String,
    },
    Bridge {
        amount: Amount,
        from_chain: String,
        to_chain: String,
    },
}

impl PromptRequest {
    /// Placeholder names, in order, a template must use to serve this request.
    fn placeholders(&self) -> Vec<&str> {
        match self {
            PromptRequest::Swap { amount, .. } => {
                vec![amount.key(), "from_token", "to_token", "chain_name"]
            }
            PromptRequest::Bridge { amount, .. } => vec![amount.key(), "from_chain", "to_chain"],
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match (self, name) {
            (PromptRequest::Swap { amount, .. } | PromptRequest::Bridge { amount, .. }, key)
                if key == amount.key() =>
            {
                Some(amount.value().to_string())
            }
            (PromptRequest::Swap { from_token, .. }, "from_token") => Some(from_token.clone()),
            (PromptRequest::Swap { to_token, .. }, "to_token") => Some(to_token.clone()),
            (PromptRequest::Swap { chain_name, .. }, "chain_name") => Some(chain_name.clone()),
            (PromptRequest::Bridge { from_chain, .. }, "from_chain") => Some(from_chain.clone()),
            (PromptRequest::Bridge { to_chain, .. }, "to_chain") => Some(to_chain.clone()),
            _ => None,
        }
    }
}

/// Swap and bridge templates, one per line.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBook {
    pub swap: Vec<String>,
    pub bridge: Vec<String>,
}

impl PromptBook {
    /// Built-in templates.
    pub fn defaults() -> Self {
        Self {
            swap: DEFAULT_SWAP.iter().map(|s| s.to_string()).collect(),
            bridge: DEFAULT_BRIDGE.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Read templates from `input_dir`, falling back to the defaults per missing file.
    pub async fn load(input_dir: &Path) -> Result<Self, PipelineError> {
        let defaults = Self::defaults();
        Ok(Self {
            swap: read_templates(&input_dir.join(SWAP_FILE))
                .await?
                .unwrap_or(defaults.swap),
            bridge: read_templates(&input_dir.join(BRIDGE_FILE))
                .await?
                .unwrap_or(defaults.bridge),
        })
    }

    /// Render `request` with a random template whose placeholders match it exactly.
    pub fn render(&self, request: &PromptRequest) -> Result<String, PipelineError> {
        let (templates, file) = match request {
            PromptRequest::Swap { .. } => (&self.swap, SWAP_FILE),
            PromptRequest::Bridge { .. } => (&self.bridge, BRIDGE_FILE),
        };
        let wanted = request.placeholders();
        let matching: Vec<&String> = templates
            .iter()
            .filter(|t| placeholders(t) == wanted)
            .collect();

        let template = matching.choose(&mut rand::thread_rng()).ok_or_else(|| {
            PipelineError::Config(format!(
                "no prompt in {file} with variables: {}",
                wanted.join(", ")
            ))
        })?;

        Ok(PLACEHOLDER_RE
            .replace_all(template, |caps: &Captures| {
                request.lookup(&caps[1]).unwrap_or_default()
            })
            .into_owned())
    }
}

fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

async fn read_templates(path: &Path) -> Result<Option<Vec<String>>, PipelineError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "prompt file missing, using defaults");
            Ok(None)
        }
        Err(e) => Err(PipelineError::Config(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}
