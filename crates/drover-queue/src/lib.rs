//! Durable job queue for drover.
//!
//! This crate provides the persistent side of a run:
//! - Encrypts wallet private keys at rest (the vault)
//! - Stores per-wallet job lists as whole-file JSON snapshots
//! - Serializes every read-modify-write through a single gate
//! - Accumulates per-wallet report lines and referral codes
//! - Drives a bounded worker pool over the queue

mod error;
mod referral;
mod report;
mod scheduler;
mod store;
mod types;
mod vault;

pub use error::QueueError;
pub use report::{ReportEntry, Notify};
pub use referral::ReferralRecord;
pub use scheduler::{JobError, JobExecutor, RunSummary, Scheduler};
pub use store::{Store, StoreOptions, StoreSummary};
pub use types::{
    Claim, ClaimedJob, HoldThresholds, Job, JobContext, JobKind, JobPlan, JobStatus, WalletRecord,
};
pub use vault::{
    DEFAULT_PASSPHRASE, PassphraseSource, TerminalPrompt, Vault, VaultKey, decrypt, derive_key,
    encrypt,
};
