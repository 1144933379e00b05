//! `drover run`: unlock the store and work through every queued job.

use std::path::Path;
use std::sync::Arc;

use drover_chain::{ChainConfig, ChainTable, EvmChain};
use drover_pipeline::{Pipeline, PipelineError, PromptBook, ServiceClient};
use drover_queue::{
    ClaimedJob, JobError, JobExecutor, Notify, Scheduler, Store, TerminalPrompt, Vault,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::AppError;
use crate::notifier::TelegramNotifier;
use crate::settings::Settings;

/// Shared state behind the job executor.
struct Worker {
    vault: Vault,
    pipeline: Pipeline,
    table: Arc<ChainTable>,
    chain_config: ChainConfig,
    service_url: String,
    country_code: String,
}

impl Worker {
    async fn execute(&self, claimed: ClaimedJob) -> Result<(), JobError> {
        self.try_execute(&claimed).await.map_err(job_error)
    }

    async fn try_execute(&self, claimed: &ClaimedJob) -> Result<(), PipelineError> {
        let private_key = self.vault.decrypt(&claimed.encrypted_key)?;
        let route = claimed.route.as_deref();

        let chain = EvmChain::new(
            &private_key,
            Arc::clone(&self.table),
            self.chain_config.clone(),
            route,
        )?;
        let service = ServiceClient::new(
            self.service_url.as_str(),
            claimed.address.as_str(),
            self.country_code.as_str(),
            route,
        )?;

        self.pipeline.execute(claimed, &chain, &service).await
    }
}

/// Sort a pipeline failure into what the scheduler does with it.
fn job_error(error: PipelineError) -> JobError {
    if error.is_fatal() {
        let message = error.to_string();
        return match error.into_queue_error() {
            Some(queue) => JobError::Fatal(queue),
            None => JobError::Failed(message),
        };
    }
    if error.is_reported() {
        return JobError::Reported;
    }
    JobError::Failed(error.to_string())
}

fn executor(worker: Arc<Worker>) -> JobExecutor {
    Arc::new(move |claimed: ClaimedJob| {
        let worker = Arc::clone(&worker);
        Box::pin(async move { worker.execute(claimed).await })
    })
}

pub async fn run(
    data_dir: &Path,
    input_dir: &Path,
    settings: &Settings,
    threads: Option<usize>,
) -> Result<(), AppError> {
    let store = Arc::new(Store::open(data_dir, settings.store_options()).await?);

    let sample = store.sample_ciphertext().await?;
    let vault =
        tokio::task::spawn_blocking(move || Vault::unlock(sample.as_deref(), &mut TerminalPrompt))
            .await??;

    let loaded = store.reset_failed().await?;
    if loaded.wallets == 0 {
        warn!(dir = %data_dir.display(), "job store is empty, run `drover create` first");
        return Ok(());
    }
    info!(
        wallets = loaded.wallets,
        jobs = loaded.jobs,
        reset = loaded.reset,
        "loaded wallets"
    );

    let prompts = PromptBook::load(input_dir).await?;
    let pipeline = Pipeline::new(
        Arc::clone(&store),
        Arc::new(settings.pipeline_config()?),
        Arc::new(prompts),
    );
    let worker = Arc::new(Worker {
        vault,
        pipeline,
        table: Arc::new(settings.chain_table()?),
        chain_config: settings.chain_config(),
        service_url: settings.service_url.clone(),
        country_code: settings.country_code.clone(),
    });

    let notifier: Arc<dyn Notify> = Arc::new(
        TelegramNotifier::new(&settings.telegram)
            .map_err(|e| AppError::Config(format!("telegram client: {e}")))?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let workers = threads.unwrap_or(settings.threads);
    let summary = Scheduler::new(store, notifier)
        .with_workers(workers)
        .with_cooldown(settings.cooldown())
        .run(executor(worker), shutdown_rx)
        .await?;

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "all accounts done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_chain::ChainError;
    use drover_queue::QueueError;

    fn exhausted(source: PipelineError) -> PipelineError {
        PipelineError::Exhausted {
            operation: "swap".into(),
            source: Box::new(source),
        }
    }

    #[test]
    fn test_store_violation_is_fatal() {
        let err = exhausted(PipelineError::Queue(QueueError::DataStore("gone".into())));
        assert!(matches!(
            job_error(err),
            JobError::Fatal(QueueError::DataStore(_))
        ));
    }

    #[test]
    fn test_revert_is_already_reported() {
        let err = exhausted(PipelineError::Chain(ChainError::Reverted {
            link: "https://basescan.org/tx/0x1".into(),
        }));
        assert!(matches!(job_error(err), JobError::Reported));
    }

    #[test]
    fn test_other_errors_fail_with_message() {
        let err = exhausted(PipelineError::Protocol("no pipeline id".into()));
        match job_error(err) {
            JobError::Failed(message) => {
                assert_eq!(message, "swap: protocol error: no pipeline id")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wrong_key_is_not_fatal() {
        let err = PipelineError::Queue(QueueError::Authentication("invalid password".into()));
        assert!(matches!(job_error(err), JobError::Failed(_)));
    }
}
