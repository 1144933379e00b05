//! `drover create`: build a fresh job store from the input files.

use std::path::Path;

use drover_queue::{PassphraseSource, Store, StoreSummary, TerminalPrompt, Vault};
use tracing::info;

use crate::error::AppError;
use crate::settings::Settings;

pub const KEYS_FILE: &str = "privatekeys.txt";
pub const ROUTES_FILE: &str = "proxies.txt";

pub async fn run(data_dir: &Path, input_dir: &Path, settings: &Settings) -> Result<(), AppError> {
    let store = Store::open(data_dir, settings.store_options()).await?;

    let passphrase = tokio::task::spawn_blocking(|| {
        TerminalPrompt.next_passphrase("Set a password to encrypt private keys (empty for none): ")
    })
    .await?;
    let vault = Vault::from_passphrase(passphrase.as_deref().unwrap_or_default());

    let summary = populate(&store, &vault, input_dir, settings).await?;
    info!(
        wallets = summary.wallets,
        jobs = summary.jobs,
        dir = %data_dir.display(),
        "job store ready"
    );
    Ok(())
}

/// Fill `store` from the key and route lists in `input_dir`.
pub async fn populate(
    store: &Store,
    vault: &Vault,
    input_dir: &Path,
    settings: &Settings,
) -> Result<StoreSummary, AppError> {
    let keys = read_lines(&input_dir.join(KEYS_FILE), true).await?;
    let routes = read_lines(&input_dir.join(ROUTES_FILE), false).await?;
    info!(keys = keys.len(), routes = routes.len(), "loaded input files");

    Ok(store
        .create(vault, &keys, &routes, &settings.job_plan())
        .await?)
}

/// Non-blank, trimmed lines of a text file. A missing optional file reads as empty.
async fn read_lines(path: &Path, required: bool) -> Result<Vec<String>, AppError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(AppError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
