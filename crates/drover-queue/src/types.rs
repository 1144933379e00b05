//! Queue types.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Data carried from a job's opening leg to its closing leg.
///
/// Empty for an opening leg.
pub type JobContext = serde_json::Map<String, serde_json::Value>;

/// Kind of on-chain action a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Token swap on a single chain.
    Swap,
    /// Cross-chain bridge of native ETH.
    Bridge,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Swap => "swap",
            JobKind::Bridge => "bridge",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed.
    #[default]
    ToRun,
    /// Last execution failed; flipped back to `ToRun` on the next run.
    Failed,
    /// Finished. Completed jobs are removed rather than stored.
    Completed,
}

/// One queued unit of work for a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Tells otherwise identical sibling jobs apart when a claim is committed.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub kind: JobKind,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub context: JobContext,
}

impl Job {
    /// Create an opening-leg job.
    pub fn opening(kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::ToRun,
            context: JobContext::new(),
        }
    }

    /// Create a closing-leg job carrying the opening leg's context.
    pub fn closing(kind: JobKind, context: JobContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::ToRun,
            context,
        }
    }

    /// Whether this job reverses a position opened by an earlier leg.
    pub fn is_closing(&self) -> bool {
        !self.context.is_empty()
    }

    pub fn is_runnable(&self) -> bool {
        self.status == JobStatus::ToRun
    }
}

/// A wallet and its queued jobs, keyed in the store by its encrypted private key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Checksummed public address.
    pub address: String,
    pub jobs: Vec<Job>,
    /// Optional network egress route (proxy URL).
    #[serde(default)]
    pub route: Option<String>,
}

/// How many opening jobs of each kind a fresh wallet receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    pub swap_times: RangeInclusive<u32>,
    pub bridge_times: RangeInclusive<u32>,
}

impl Default for JobPlan {
    fn default() -> Self {
        Self {
            swap_times: 1..=2,
            bridge_times: 0..=0,
        }
    }
}

/// Number of open positions per kind at which closing legs take priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldThresholds {
    pub swap: usize,
    pub bridge: usize,
}

impl HoldThresholds {
    pub fn for_kind(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::Swap => self.swap,
            JobKind::Bridge => self.bridge,
        }
    }
}

impl Default for HoldThresholds {
    fn default() -> Self {
        Self { swap: 1, bridge: 1 }
    }
}

/// A job handed to a worker, with the pre-claim snapshot used to commit it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub encrypted_key: String,
    pub address: String,
    pub route: Option<String>,
    pub job: Job,
}

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Job(ClaimedJob),
    /// No runnable job remains outside the excluded wallets.
    Exhausted,
}
