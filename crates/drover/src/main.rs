//! Drover: wallet automation for conversational swaps and bridges
//!
//! Main binary with subcommands:
//! - `create`: Build the encrypted job store from the input files
//! - `run`: Work through the job store with a pool of workers

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod create;
mod error;
mod notifier;
mod run;
mod settings;

use settings::Settings;

#[derive(Parser)]
#[command(name = "drover")]
#[command(about = "Wallet automation for conversational swaps and bridges", long_about = None)]
struct Cli {
    /// Directory holding the job, report and referral stores
    #[arg(long, global = true, env = "DROVER_DATA_DIR", default_value = "databases")]
    data_dir: PathBuf,

    /// Directory with privatekeys.txt, proxies.txt and prompt templates
    #[arg(long, global = true, env = "DROVER_INPUT_DIR", default_value = "input_data")]
    input_dir: PathBuf,

    /// Settings file (JSON); missing means defaults
    #[arg(long, global = true, env = "DROVER_SETTINGS", default_value = "settings.json")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fresh job store from the private key and proxy lists
    Create,

    /// Run every queued job
    Run {
        /// Override the worker count from settings
        #[arg(long)]
        threads: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "drover=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.settings)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    match cli.command {
        Commands::Create => create::run(&cli.data_dir, &cli.input_dir, &settings)
            .await
            .map_err(|e| miette::miette!("Failed to create job store: {}", e)),

        Commands::Run { threads } => run::run(&cli.data_dir, &cli.input_dir, &settings, threads)
            .await
            .map_err(|e| miette::miette!("Run aborted: {}", e)),
    }
}
