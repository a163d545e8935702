//! Conditional transaction scheduler.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────┐   new head    ┌───────────┐   pending set   ┌────────────────┐
//!   │ BlockWatcher │──────────────▶│ Processor │◀───────────────▶│ FileRepository │
//!   │ (per chain)  │               └─────┬─────┘                 └────────────────┘
//!   └──────┬───────┘                     │ lowest nonce group, by priority
//!          │ get_block_number            ▼
//!          │                    ┌─────────────────────┐   safe-low price  ┌───────────────┐
//!          │                    │ TransactionExecutor │──────────────────▶│ HttpGasOracle │
//!          │                    │  gates → broadcast  │                   └───────────────┘
//!          ▼                    └─────────┬───────────┘
//!   ┌────────────────┐                    │
//!   │ RetryingClient │◀───────────────────┘
//!   │ → EvmChainClient (alloy, failover)
//!   └────────────────┘
//! ```

use clap::Parser;
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tx_scheduler::config::load_config;
use tx_scheduler::gas::HttpGasOracle;
use tx_scheduler::lifecycle::{connect_chains, wait_for_signal, Scheduler, Shutdown};
use tx_scheduler::notify::{LogNotifier, NotificationSink};
use tx_scheduler::observability::{logging, metrics};
use tx_scheduler::schedule::FileRepository;

/// How long watchers get to finish in-flight ticks after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "tx-scheduler")]
#[command(about = "Broadcasts pre-signed transactions when their conditions hold", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "scheduler.toml")]
    config: PathBuf,

    /// Process these record ids once at the current head, then exit.
    #[arg(long, num_args = 1..)]
    reprocess: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tx-scheduler starting");

    tracing::info!(
        config = %args.config.display(),
        chains = config.chains.len(),
        confirmations = config.executor.confirmations,
        dry_run = config.executor.dry_run,
        store = %config.storage.path,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let chains = connect_chains(&config).await?;
    let repository = FileRepository::load_from_file(&config.storage.path)?;
    let gas_oracle = Arc::new(HttpGasOracle::new(&config.chains, chains.clone()));
    let notifier: Arc<dyn NotificationSink> = Arc::new(LogNotifier);

    let mut scheduler = Scheduler::assemble(&config, chains, repository, gas_oracle, notifier);

    if !args.reprocess.is_empty() {
        tracing::info!(ids = ?args.reprocess, "Reprocessing records");
        scheduler.processor.process_by_ids(&args.reprocess).await;
        scheduler.repository.flush().await?;
        return Ok(());
    }

    let shutdown = Shutdown::new();
    let watchers = scheduler.watcher_count();
    let tasks = scheduler.spawn_tasks(&shutdown);
    tracing::info!(watchers, "Watching for new blocks");

    wait_for_signal().await;
    shutdown.trigger();

    if tokio::time::timeout(SHUTDOWN_GRACE, join_all(tasks)).await.is_err() {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Watchers did not stop in time"
        );
    }

    scheduler.repository.flush().await?;
    tracing::info!(records = scheduler.repository.count(), "Shutdown complete");
    Ok(())
}
