//! File-backed job store.
//!
//! Every mutation re-reads the whole document, edits it in memory and writes
//! it back while holding `gate`. Writes land in a sibling temp file first and
//! are renamed into place, so the file on disk is always a complete snapshot.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use alloy::signers::local::PrivateKeySigner;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::referral::ReferralRecord;
use crate::report::ReportEntry;
use crate::{
    Claim, ClaimedJob, HoldThresholds, Job, JobKind, JobPlan, JobStatus, QueueError, Vault,
    WalletRecord,
};

const JOBS_FILE: &str = "jobs.json";
const REPORTS_FILE: &str = "reports.json";
const REFERRALS_FILE: &str = "referrals.json";

pub(crate) type JobsDocument = BTreeMap<String, WalletRecord>;
pub(crate) type ReportsDocument = BTreeMap<String, ReportEntry>;
pub(crate) type ReferralsDocument = Vec<ReferralRecord>;

/// Selection policy for a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub hold: HoldThresholds,
    /// Pick a random eligible job instead of the first one.
    pub shuffle: bool,
    /// Percent chance that a new account registers with someone's referral code.
    pub referral_chance: u8,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            hold: HoldThresholds::default(),
            shuffle: true,
            referral_chance: 80,
        }
    }
}

/// Counts reported after loading a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreSummary {
    pub wallets: usize,
    pub jobs: usize,
    pub reset: usize,
}

/// Durable mapping from encrypted private key to wallet record.
pub struct Store {
    dir: PathBuf,
    options: StoreOptions,
    gate: Mutex<()>,
}

impl Store {
    /// Open the store in `dir`, creating empty documents that don't exist yet.
    pub async fn open(dir: impl Into<PathBuf>, options: StoreOptions) -> Result<Self, QueueError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        for (name, empty) in [(JOBS_FILE, "{}"), (REPORTS_FILE, "{}"), (REFERRALS_FILE, "[]")] {
            let path = dir.join(name);
            if !fs::try_exists(&path).await? {
                fs::write(&path, empty).await?;
                debug!(path = %path.display(), "created store file");
            }
        }

        let store = Self {
            dir,
            options,
            gate: Mutex::new(()),
        };
        store.pin_job_ids().await?;
        Ok(store)
    }

    /// Persist ids for jobs stored without one, so every later read sees the same id.
    async fn pin_job_ids(&self) -> Result<(), QueueError> {
        let path = self.dir.join(JOBS_FILE);
        let raw: serde_json::Value = read_json(&path).await?;
        let missing = raw
            .as_object()
            .into_iter()
            .flat_map(|wallets| wallets.values())
            .filter_map(|wallet| wallet.get("jobs").and_then(|jobs| jobs.as_array()))
            .flatten()
            .any(|job| job.get("id").is_none());

        if missing {
            let doc = self.read_jobs().await?;
            self.write_jobs(&doc).await?;
            debug!("assigned ids to stored jobs");
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Take the store-wide gate. Held only across in-memory edits and file IO.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    pub(crate) async fn read_jobs(&self) -> Result<JobsDocument, QueueError> {
        read_json(&self.dir.join(JOBS_FILE)).await
    }

    pub(crate) async fn write_jobs(&self, doc: &JobsDocument) -> Result<(), QueueError> {
        write_json(&self.dir.join(JOBS_FILE), doc).await
    }

    pub(crate) async fn read_reports(&self) -> Result<ReportsDocument, QueueError> {
        read_json(&self.dir.join(REPORTS_FILE)).await
    }

    pub(crate) async fn write_reports(&self, doc: &ReportsDocument) -> Result<(), QueueError> {
        write_json(&self.dir.join(REPORTS_FILE), doc).await
    }

    pub(crate) async fn read_referrals(&self) -> Result<ReferralsDocument, QueueError> {
        read_json(&self.dir.join(REFERRALS_FILE)).await
    }

    pub(crate) async fn write_referrals(&self, doc: &ReferralsDocument) -> Result<(), QueueError> {
        write_json(&self.dir.join(REFERRALS_FILE), doc).await
    }

    /// Build a fresh store from private keys, replacing any previous contents.
    ///
    /// Routes are cycled over the keys; with no routes every wallet goes direct.
    /// The report store is cleared.
    #[tracing::instrument(skip_all, fields(keys = private_keys.len(), routes = routes.len()))]
    pub async fn create(
        &self,
        vault: &Vault,
        private_keys: &[String],
        routes: &[String],
        plan: &JobPlan,
    ) -> Result<StoreSummary, QueueError> {
        if private_keys.is_empty() {
            return Err(QueueError::Config("no private keys provided".to_string()));
        }
        if plan.swap_times.is_empty() || plan.bridge_times.is_empty() {
            return Err(QueueError::Config(format!(
                "invalid job plan: swaps {:?}, bridges {:?}",
                plan.swap_times, plan.bridge_times
            )));
        }

        let mut doc = JobsDocument::new();
        for (index, key) in private_keys.iter().enumerate() {
            let signer: PrivateKeySigner = key.trim().parse().map_err(|e| {
                QueueError::Config(format!("private key #{} is invalid: {}", index + 1, e))
            })?;
            let route = (!routes.is_empty()).then(|| routes[index % routes.len()].clone());

            let record = WalletRecord {
                address: signer.address().to_string(),
                jobs: plan_jobs(plan),
                route,
            };
            doc.insert(vault.encrypt(key.trim())?, record);
        }

        let summary = summarize(&doc, 0);

        let _guard = self.lock().await;
        self.write_jobs(&doc).await?;
        self.write_reports(&ReportsDocument::new()).await?;

        info!(wallets = summary.wallets, jobs = summary.jobs, "created job store");
        Ok(summary)
    }

    /// Any stored ciphertext, used to verify a vault passphrase.
    pub async fn sample_ciphertext(&self) -> Result<Option<String>, QueueError> {
        let _guard = self.lock().await;
        Ok(self.read_jobs().await?.into_keys().next())
    }

    /// Flip every failed job back to runnable and report what is left.
    #[tracing::instrument(skip(self))]
    pub async fn reset_failed(&self) -> Result<StoreSummary, QueueError> {
        let _guard = self.lock().await;
        let mut doc = self.read_jobs().await?;

        let mut reset = 0;
        for job in doc.values_mut().flat_map(|w| w.jobs.iter_mut()) {
            if job.status == JobStatus::Failed {
                job.status = JobStatus::ToRun;
                reset += 1;
            }
        }
        if reset > 0 {
            self.write_jobs(&doc).await?;
        }

        let summary = summarize(&doc, reset);
        info!(
            wallets = summary.wallets,
            jobs = summary.jobs,
            reset = summary.reset,
            "loaded wallets"
        );
        Ok(summary)
    }

    /// Number of wallets currently stored.
    pub async fn wallet_count(&self) -> Result<usize, QueueError> {
        let _guard = self.lock().await;
        Ok(self.read_jobs().await?.len())
    }

    /// Snapshot of one wallet's record.
    pub async fn wallet(&self, encrypted_key: &str) -> Result<Option<WalletRecord>, QueueError> {
        let _guard = self.lock().await;
        Ok(self.read_jobs().await?.remove(encrypted_key))
    }

    /// Claim one runnable job from a wallet not in `excluding`.
    ///
    /// Closing legs are preferred per wallet once a kind's open positions reach
    /// its hold threshold.
    pub async fn claim_random(&self, excluding: &HashSet<String>) -> Result<Claim, QueueError> {
        let _guard = self.lock().await;
        let doc = self.read_jobs().await?;

        let mut candidates = Vec::new();
        for (encrypted_key, wallet) in &doc {
            if excluding.contains(&wallet.address) {
                continue;
            }
            candidates.extend(eligible_jobs(wallet, &self.options.hold).into_iter().map(|job| {
                ClaimedJob {
                    encrypted_key: encrypted_key.clone(),
                    address: wallet.address.clone(),
                    route: wallet.route.clone(),
                    job: job.clone(),
                }
            }));
        }

        if self.options.shuffle {
            candidates.shuffle(&mut rand::thread_rng());
        }

        match candidates.into_iter().next() {
            Some(claimed) => {
                debug!(address = %claimed.address, kind = %claimed.job.kind, "claimed job");
                Ok(Claim::Job(claimed))
            }
            None => Ok(Claim::Exhausted),
        }
    }

    /// Record the outcome of a claimed job.
    ///
    /// Success removes the job, and the whole wallet when it was the last one.
    /// Failure keeps the job and marks it failed. The claimed snapshot, id
    /// included, must still be present exactly as claimed, otherwise the store
    /// changed underneath the worker and [`QueueError::DataStore`] is returned.
    #[tracing::instrument(skip(self, claimed), fields(address = %claimed.address, kind = %claimed.job.kind))]
    pub async fn commit_outcome(&self, claimed: &ClaimedJob, success: bool) -> Result<(), QueueError> {
        let _guard = self.lock().await;
        let mut doc = self.read_jobs().await?;

        let wallet = doc.get_mut(&claimed.encrypted_key).ok_or_else(|| {
            QueueError::DataStore(format!("wallet {} is no longer in the store", claimed.address))
        })?;
        let position = wallet
            .jobs
            .iter()
            .position(|job| *job == claimed.job)
            .ok_or_else(|| {
                QueueError::DataStore(format!(
                    "{} job for {} changed since it was claimed",
                    claimed.job.kind, claimed.address
                ))
            })?;

        if !success {
            wallet.jobs[position].status = JobStatus::Failed;
        } else if wallet.jobs.len() == 1 {
            doc.remove(&claimed.encrypted_key);
            info!("wallet finished all jobs");
        } else {
            wallet.jobs.remove(position);
        }

        self.write_jobs(&doc).await
    }

    /// Queue a follow-up job for a wallet.
    pub async fn append_job(&self, encrypted_key: &str, job: Job) -> Result<(), QueueError> {
        let _guard = self.lock().await;
        let mut doc = self.read_jobs().await?;

        let wallet = doc
            .get_mut(encrypted_key)
            .ok_or_else(|| QueueError::WalletNotFound(short_key(encrypted_key)))?;
        debug!(address = %wallet.address, kind = %job.kind, "appended job");
        wallet.jobs.push(job);

        self.write_jobs(&doc).await
    }

    /// Runnable jobs left for a wallet; zero when the wallet is gone.
    pub async fn remaining_count(&self, encrypted_key: &str) -> Result<usize, QueueError> {
        let _guard = self.lock().await;
        let doc = self.read_jobs().await?;
        Ok(doc
            .get(encrypted_key)
            .map(|w| w.jobs.iter().filter(|j| j.is_runnable()).count())
            .unwrap_or(0))
    }
}

/// The runnable jobs a wallet may hand out right now.
fn eligible_jobs<'a>(wallet: &'a WalletRecord, hold: &HoldThresholds) -> Vec<&'a Job> {
    let open_positions = |kind: JobKind| -> Vec<&'a Job> {
        wallet
            .jobs
            .iter()
            .filter(|j| j.kind == kind && j.is_closing() && j.is_runnable())
            .collect()
    };

    let mut preferred = Vec::new();
    for kind in [JobKind::Bridge, JobKind::Swap] {
        let open = open_positions(kind);
        if open.len() >= hold.for_kind(kind) {
            preferred.extend(open);
        }
    }

    if preferred.is_empty() {
        wallet.jobs.iter().filter(|j| j.is_runnable()).collect()
    } else {
        preferred
    }
}

fn plan_jobs(plan: &JobPlan) -> Vec<Job> {
    let mut rng = rand::thread_rng();
    let swaps = rng.gen_range(plan.swap_times.clone());
    let bridges = rng.gen_range(plan.bridge_times.clone());

    let mut jobs: Vec<Job> = (0..swaps).map(|_| Job::opening(JobKind::Swap)).collect();
    jobs.extend((0..bridges).map(|_| Job::opening(JobKind::Bridge)));
    jobs
}

fn summarize(doc: &JobsDocument, reset: usize) -> StoreSummary {
    StoreSummary {
        wallets: doc.len(),
        jobs: doc.values().map(|w| w.jobs.len()).sum(),
        reset,
    }
}

/// Enough of a ciphertext to identify it in errors without dumping it.
fn short_key(encrypted_key: &str) -> String {
    encrypted_key.chars().take(12).collect()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, QueueError> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), QueueError> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    const KEY_A: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const KEY_B: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

    fn closing_swap(token: &str) -> Job {
        let mut context = crate::JobContext::new();
        context.insert("token_name".into(), json!(token));
        Job::closing(JobKind::Swap, context)
    }

    fn one_swap() -> JobPlan {
        JobPlan {
            swap_times: 1..=1,
            bridge_times: 0..=0,
        }
    }

    async fn store_with(plan: JobPlan, keys: &[&str]) -> (TempDir, Store, Vault) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), StoreOptions::default()).await.unwrap();
        let vault = Vault::from_passphrase("test");
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        store.create(&vault, &keys, &[], &plan).await.unwrap();
        (dir, store, vault)
    }

    async fn claim(store: &Store) -> ClaimedJob {
        match store.claim_random(&HashSet::new()).await.unwrap() {
            Claim::Job(job) => job,
            Claim::Exhausted => panic!("expected a job"),
        }
    }

    #[tokio::test]
    async fn test_open_creates_empty_documents() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("db"), StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(store.wallet_count().await.unwrap(), 0);
        assert!(store.read_referrals().await.unwrap().is_empty());
        assert_eq!(
            store.claim_random(&HashSet::new()).await.unwrap(),
            Claim::Exhausted
        );
    }

    #[tokio::test]
    async fn test_create_rejects_empty_and_invalid_keys() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), StoreOptions::default()).await.unwrap();
        let vault = Vault::from_passphrase("");

        let err = store.create(&vault, &[], &[], &one_swap()).await.unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));

        let err = store
            .create(&vault, &["0xnotakey".to_string()], &[], &one_swap())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
    }

    #[tokio::test]
    async fn test_create_encrypts_keys_and_cycles_routes() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), StoreOptions::default()).await.unwrap();
        let vault = Vault::from_passphrase("pw");
        let keys = vec![KEY_A.to_string(), KEY_B.to_string(), KEY_A.to_string()];
        let routes = vec!["http://one".to_string(), "http://two".to_string()];

        let summary = store.create(&vault, &keys, &routes, &one_swap()).await.unwrap();
        assert_eq!(summary.wallets, 3);
        assert_eq!(summary.jobs, 3);

        let doc = store.read_jobs().await.unwrap();
        let mut routes: Vec<_> = doc.values().filter_map(|w| w.route.clone()).collect();
        routes.sort();
        assert_eq!(routes, vec!["http://one", "http://one", "http://two"]);
        for (ciphertext, wallet) in &doc {
            let key = vault.decrypt(ciphertext).unwrap();
            let signer: PrivateKeySigner = key.parse().unwrap();
            assert_eq!(signer.address().to_string(), wallet.address);
        }
    }

    #[tokio::test]
    async fn test_create_clears_reports() {
        let (_dir, store, vault) = store_with(one_swap(), &[KEY_A]).await;
        let key = store.sample_ciphertext().await.unwrap().unwrap();
        store.append_report(&key, "old line", Some(true)).await.unwrap();

        store
            .create(&vault, &[KEY_B.to_string()], &[], &one_swap())
            .await
            .unwrap();
        assert!(store.read_reports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_job_success_removes_wallet() {
        let (_dir, store, _vault) = store_with(one_swap(), &[KEY_A]).await;
        let claimed = claim(&store).await;

        store.commit_outcome(&claimed, true).await.unwrap();
        assert_eq!(store.wallet(&claimed.encrypted_key).await.unwrap(), None);
        assert_eq!(store.remaining_count(&claimed.encrypted_key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_last_job_failure_keeps_wallet_failed() {
        let (_dir, store, _vault) = store_with(one_swap(), &[KEY_A]).await;
        let claimed = claim(&store).await;

        store.commit_outcome(&claimed, false).await.unwrap();
        let wallet = store.wallet(&claimed.encrypted_key).await.unwrap().unwrap();
        assert_eq!(wallet.jobs.len(), 1);
        assert_eq!(wallet.jobs[0].status, JobStatus::Failed);
        assert_eq!(
            store.claim_random(&HashSet::new()).await.unwrap(),
            Claim::Exhausted
        );
    }

    #[tokio::test]
    async fn test_double_commit_is_consistency_violation() {
        let plan = JobPlan {
            swap_times: 1..=1,
            bridge_times: 1..=1,
        };
        for first_outcome in [true, false] {
            let (_dir, store, _vault) = store_with(plan.clone(), &[KEY_A]).await;
            let claimed = claim(&store).await;

            store.commit_outcome(&claimed, first_outcome).await.unwrap();
            let err = store.commit_outcome(&claimed, true).await.unwrap_err();
            assert!(matches!(err, QueueError::DataStore(_)));
            assert!(err.is_fatal());
        }
    }

    #[tokio::test]
    async fn test_success_with_remaining_removes_only_that_job() {
        let plan = JobPlan {
            swap_times: 2..=2,
            bridge_times: 0..=0,
        };
        let (_dir, store, _vault) = store_with(plan, &[KEY_A]).await;
        let claimed = claim(&store).await;

        store.commit_outcome(&claimed, true).await.unwrap();
        let wallet = store.wallet(&claimed.encrypted_key).await.unwrap().unwrap();
        assert_eq!(wallet.jobs.len(), 1);
        assert_ne!(wallet.jobs[0].id, claimed.job.id);
        assert_eq!(wallet.jobs[0].kind, JobKind::Swap);
    }

    #[tokio::test]
    async fn test_double_commit_with_identical_siblings() {
        let plan = JobPlan {
            swap_times: 2..=2,
            bridge_times: 0..=0,
        };
        for first_outcome in [true, false] {
            let (_dir, store, _vault) = store_with(plan.clone(), &[KEY_A]).await;
            let claimed = claim(&store).await;

            store.commit_outcome(&claimed, first_outcome).await.unwrap();
            let err = store.commit_outcome(&claimed, true).await.unwrap_err();
            assert!(matches!(err, QueueError::DataStore(_)));

            // The untouched sibling is still queued.
            let wallet = store.wallet(&claimed.encrypted_key).await.unwrap().unwrap();
            let expected = if first_outcome { 1 } else { 2 };
            assert_eq!(wallet.jobs.len(), expected);
            assert!(
                wallet
                    .jobs
                    .iter()
                    .any(|job| job.id != claimed.job.id && job.is_runnable())
            );
        }
    }

    #[tokio::test]
    async fn test_open_pins_missing_job_ids() {
        let dir = TempDir::new().unwrap();
        let doc = json!({
            "cipher": {
                "address": "0xabc",
                "jobs": [{"kind": "swap"}, {"kind": "swap"}]
            }
        });
        tokio::fs::write(dir.path().join(JOBS_FILE), doc.to_string())
            .await
            .unwrap();

        let store = Store::open(dir.path(), StoreOptions::default()).await.unwrap();
        let first = store.wallet("cipher").await.unwrap().unwrap();
        let second = store.wallet("cipher").await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_ne!(first.jobs[0].id, first.jobs[1].id);
    }

    #[tokio::test]
    async fn test_opening_leg_then_commit_leaves_closing_leg() {
        let (_dir, store, _vault) = store_with(one_swap(), &[KEY_A]).await;
        let claimed = claim(&store).await;
        assert!(!claimed.job.is_closing());

        store
            .append_job(&claimed.encrypted_key, closing_swap("USDC"))
            .await
            .unwrap();
        store.commit_outcome(&claimed, true).await.unwrap();

        let wallet = store.wallet(&claimed.encrypted_key).await.unwrap().unwrap();
        assert_eq!(wallet.jobs.len(), 1);
        assert_eq!(wallet.jobs[0].context, closing_swap("USDC").context);
        assert_eq!(store.remaining_count(&claimed.encrypted_key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claim_prefers_closing_leg_at_threshold() {
        let (_dir, store, _vault) = store_with(one_swap(), &[KEY_A]).await;
        let key = store.sample_ciphertext().await.unwrap().unwrap();
        let closing = closing_swap("DAI");
        store.append_job(&key, closing.clone()).await.unwrap();

        for _ in 0..20 {
            assert_eq!(claim(&store).await.job, closing);
        }
    }

    #[tokio::test]
    async fn test_claim_mixes_below_threshold() {
        let dir = TempDir::new().unwrap();
        let options = StoreOptions {
            hold: HoldThresholds { swap: 2, bridge: 1 },
            shuffle: false,
            ..StoreOptions::default()
        };
        let store = Store::open(dir.path(), options).await.unwrap();
        let vault = Vault::from_passphrase("");
        store
            .create(&vault, &[KEY_A.to_string()], &[], &one_swap())
            .await
            .unwrap();
        let key = store.sample_ciphertext().await.unwrap().unwrap();
        store.append_job(&key, closing_swap("DAI")).await.unwrap();

        // One open position is under the threshold of two, so the opening leg stays eligible.
        assert!(!claim(&store).await.job.is_closing());
    }

    #[tokio::test]
    async fn test_claim_skips_excluded_wallets() {
        let (_dir, store, _vault) = store_with(one_swap(), &[KEY_A, KEY_B]).await;
        let first = claim(&store).await;

        let excluding = HashSet::from([first.address.clone()]);
        match store.claim_random(&excluding).await.unwrap() {
            Claim::Job(second) => assert_ne!(second.address, first.address),
            Claim::Exhausted => panic!("second wallet should be claimable"),
        }

        let both: HashSet<String> = store
            .read_jobs()
            .await
            .unwrap()
            .values()
            .map(|w| w.address.clone())
            .collect();
        assert_eq!(store.claim_random(&both).await.unwrap(), Claim::Exhausted);
    }

    #[tokio::test]
    async fn test_reset_failed_requeues() {
        let (_dir, store, _vault) = store_with(one_swap(), &[KEY_A]).await;
        let claimed = claim(&store).await;
        store.commit_outcome(&claimed, false).await.unwrap();

        let summary = store.reset_failed().await.unwrap();
        assert_eq!(
            summary,
            StoreSummary {
                wallets: 1,
                jobs: 1,
                reset: 1
            }
        );
        let again = claim(&store).await;
        assert_eq!(again.job.id, claimed.job.id);
        assert_eq!(again.job.status, JobStatus::ToRun);
    }

    #[tokio::test]
    async fn test_append_job_unknown_wallet() {
        let (_dir, store, _vault) = store_with(one_swap(), &[KEY_A]).await;
        let err = store
            .append_job("missing", Job::opening(JobKind::Bridge))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::WalletNotFound(_)));
    }

    #[test]
    fn test_eligible_jobs_prefers_bridges_and_swaps_together() {
        let mut context = crate::JobContext::new();
        context.insert("from_chain".into(), json!("arbitrum"));
        context.insert("token_amount".into(), json!(0.001));
        let wallet = WalletRecord {
            address: "0xabc".into(),
            jobs: vec![
                Job::opening(JobKind::Swap),
                closing_swap("USDC"),
                Job::closing(JobKind::Bridge, context.clone()),
                Job::opening(JobKind::Bridge),
            ],
            route: None,
        };

        let eligible = eligible_jobs(&wallet, &HoldThresholds::default());
        assert_eq!(eligible.len(), 2);
        assert!(eligible.iter().all(|j| j.is_closing()));
    }

    #[test]
    fn test_eligible_jobs_ignores_failed_open_positions() {
        let mut failed = closing_swap("USDC");
        failed.status = JobStatus::Failed;
        let opening = Job::opening(JobKind::Swap);
        let wallet = WalletRecord {
            address: "0xabc".into(),
            jobs: vec![opening.clone(), failed],
            route: None,
        };

        let eligible = eligible_jobs(&wallet, &HoldThresholds::default());
        assert_eq!(eligible, vec![&opening]);
    }
}
