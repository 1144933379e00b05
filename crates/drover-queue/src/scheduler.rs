//! Worker pool that drains the job store.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::ops::RangeInclusive;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{Claim, ClaimedJob, Notify, QueueError, Store};

/// Why a job did not succeed.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job failed. The message becomes a failure line in the wallet's report.
    #[error("{0}")]
    Failed(String),

    /// The job failed and already wrote its own report line.
    #[error("job failed")]
    Reported,

    /// The store changed underneath the job. Stops every worker.
    #[error(transparent)]
    Fatal(QueueError),
}

/// Consecutive non-fatal store errors a worker tolerates before giving up.
const MAX_STORE_ERRORS: u32 = 3;

/// Type alias for the job executor function.
pub type JobExecutor = Arc<
    dyn Fn(ClaimedJob) -> Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>> + Send + Sync,
>;

/// Totals for one run of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    fn merge(&mut self, other: RunSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Fixed-size pool of workers sharing one store.
pub struct Scheduler {
    store: Arc<Store>,
    notifier: Arc<dyn Notify>,
    workers: usize,
    cooldown: RangeInclusive<Duration>,
}

/// Everything a worker needs, cloned once per task.
#[derive(Clone)]
struct WorkerContext {
    store: Arc<Store>,
    notifier: Arc<dyn Notify>,
    executor: JobExecutor,
    active: Arc<Mutex<HashSet<String>>>,
    cooldown: RangeInclusive<Duration>,
    stop: watch::Receiver<bool>,
    total_wallets: usize,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, notifier: Arc<dyn Notify>) -> Self {
        Self {
            store,
            notifier,
            workers: 1,
            cooldown: Duration::ZERO..=Duration::ZERO,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Randomized pause a worker takes after each job.
    pub fn with_cooldown(mut self, cooldown: RangeInclusive<Duration>) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Run workers until the queue is exhausted, shutdown is requested or a
    /// worker hits a fatal store error.
    ///
    /// A fatal error stops the remaining workers after their current job and
    /// is returned once every worker has exited.
    #[tracing::instrument(skip_all, fields(workers = self.workers))]
    pub async fn run(
        &self,
        executor: JobExecutor,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, QueueError> {
        let total_wallets = self.store.wallet_count().await?;
        let (stop_tx, stop_rx) = watch::channel(*shutdown.borrow());
        let stop_tx = Arc::new(stop_tx);

        // Forward external shutdown into the pool's own stop signal.
        let forwarder = {
            let stop_tx = Arc::clone(&stop_tx);
            tokio::spawn(async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        info!("shutdown requested, workers stop after their current job");
                        stop_tx.send_replace(true);
                        break;
                    }
                }
            })
        };

        let context = WorkerContext {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            executor,
            active: Arc::new(Mutex::new(HashSet::new())),
            cooldown: self.cooldown.clone(),
            stop: stop_rx,
            total_wallets,
        };

        let mut worker_handles: Vec<JoinHandle<Result<RunSummary, QueueError>>> =
            Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let context = context.clone();
            let stop_tx = Arc::clone(&stop_tx);

            worker_handles.push(tokio::spawn(async move {
                info!(worker_id, "worker started");
                let result = work(worker_id, context).await;
                match &result {
                    Ok(summary) => info!(
                        worker_id,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        "worker stopped"
                    ),
                    Err(e) => {
                        error!(worker_id, error = %e, "worker aborted");
                        stop_tx.send_replace(true);
                    }
                }
                result
            }));
        }

        let mut summary = RunSummary::default();
        let mut fatal = None;
        for handle in worker_handles {
            match handle.await {
                Ok(Ok(worker_summary)) => summary.merge(worker_summary),
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(e) => warn!(error = %e, "worker task panicked"),
            }
        }
        forwarder.abort();

        if let Some(e) = fatal {
            return Err(e);
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "all wallets done"
        );
        Ok(summary)
    }
}

async fn work(worker_id: usize, mut ctx: WorkerContext) -> Result<RunSummary, QueueError> {
    let mut summary = RunSummary::default();
    let mut store_errors = 0;

    loop {
        if *ctx.stop.borrow() {
            break;
        }

        // The active set lock spans the claim so two workers never pick the same wallet.
        let claimed = {
            let mut active = ctx.active.lock().await;
            match ctx.store.claim_random(&active).await? {
                Claim::Exhausted => break,
                Claim::Job(claimed) => {
                    active.insert(claimed.address.clone());
                    claimed
                }
            }
        };

        info!(
            worker_id,
            address = %claimed.address,
            kind = %claimed.job.kind,
            closing = claimed.job.is_closing(),
            "running job"
        );

        let result = run_job(&ctx, &claimed).await;
        ctx.active.lock().await.remove(&claimed.address);

        match result {
            Ok(true) => {
                summary.succeeded += 1;
                store_errors = 0;
            }
            Ok(false) => {
                summary.failed += 1;
                store_errors = 0;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                summary.failed += 1;
                store_errors += 1;
                warn!(worker_id, address = %claimed.address, error = %e, "job outcome not committed");
                if store_errors >= MAX_STORE_ERRORS {
                    return Err(e);
                }
            }
        }

        pause(&ctx.cooldown, &mut ctx.stop).await;
    }

    Ok(summary)
}

/// Execute, commit and, if the wallet has nothing left, report. Returns whether the job succeeded.
async fn run_job(ctx: &WorkerContext, claimed: &ClaimedJob) -> Result<bool, QueueError> {
    let success = match execute(ctx, claimed).await {
        Ok(()) => true,
        Err(JobError::Fatal(e)) => return Err(e),
        Err(JobError::Failed(message)) => {
            warn!(address = %claimed.address, error = %message, "job failed");
            let recorded = ctx
                .store
                .append_report(&claimed.encrypted_key, &message, Some(false))
                .await;
            tolerate(recorded, &claimed.address, "failure not recorded in report")?;
            false
        }
        Err(JobError::Reported) => false,
    };

    ctx.store.commit_outcome(claimed, success).await?;

    let finished = finish_wallet(ctx, claimed).await;
    tolerate(finished, &claimed.address, "wallet summary not delivered")?;
    Ok(success)
}

/// Run the executor in its own task so a panic fails the job instead of the worker.
async fn execute(ctx: &WorkerContext, claimed: &ClaimedJob) -> Result<(), JobError> {
    match tokio::spawn((ctx.executor)(claimed.clone())).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(JobError::Failed(format!(
            "job panicked: {}",
            panic_message(e.into_panic())
        ))),
        Err(e) => Err(JobError::Failed(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| "unknown cause".to_string())
}

/// Send the wallet's summary once it has nothing left to run.
async fn finish_wallet(ctx: &WorkerContext, claimed: &ClaimedJob) -> Result<(), QueueError> {
    if ctx.store.remaining_count(&claimed.encrypted_key).await? != 0 {
        return Ok(());
    }
    let left = ctx.store.wallet_count().await?;
    let done = ctx.total_wallets.saturating_sub(left);
    let text = ctx
        .store
        .drain_report(&claimed.encrypted_key, &claimed.address, done, ctx.total_wallets)
        .await?;
    ctx.notifier.notify(text).await;
    info!(address = %claimed.address, done, total = ctx.total_wallets, "wallet finished");
    Ok(())
}

/// Report bookkeeping failures are logged; only a consistency violation stops the worker.
fn tolerate(result: Result<(), QueueError>, address: &str, what: &str) -> Result<(), QueueError> {
    match result {
        Err(e) if !e.is_fatal() => {
            warn!(address, error = %e, "{what}");
            Ok(())
        }
        other => other,
    }
}

async fn pause(cooldown: &RangeInclusive<Duration>, stop: &mut watch::Receiver<bool>) {
    let (min, max) = (*cooldown.start(), *cooldown.end());
    if max.is_zero() || max < min {
        return;
    }
    let millis = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    debug!(secs = millis / 1000, "cooling down");

    tokio::select! {
        _ = sleep(Duration::from_millis(millis)) => {}
        _ = stop.wait_for(|stopped| *stopped) => {}
    }
}
