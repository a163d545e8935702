//! Startup orchestration.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::chain::{ChainError, ChainId, ChainRegistry, EvmChainClient, RetryPolicy, RetryingClient};
use crate::config::SchedulerConfig;
use crate::executor::{InFlightSet, TransactionExecutor};
use crate::gas::GasOracle;
use crate::lifecycle::Shutdown;
use crate::notify::NotificationSink;
use crate::processor::Processor;
use crate::schedule::{FileRepository, RepositoryError};
use crate::watcher::BlockWatcher;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Chain connection failed: {0}")]
    Chain(#[from] ChainError),

    #[error("Schedule store unavailable: {0}")]
    Repository(#[from] RepositoryError),
}

/// Connect to every configured chain, each wrapped in the retry policy.
pub async fn connect_chains(config: &SchedulerConfig) -> Result<ChainRegistry, StartupError> {
    let policy = RetryPolicy::from(&config.retry);
    let mut registry = ChainRegistry::new();

    for chain in &config.chains {
        let client = EvmChainClient::new(chain.clone()).await?;
        tracing::info!(
            chain = %chain.name,
            chain_id = chain.chain_id,
            failover_urls = chain.failover_urls.len(),
            "Chain connected"
        );
        registry.insert(Arc::new(RetryingClient::new(Arc::new(client), policy.clone())));
    }
    Ok(registry)
}

/// Fully wired scheduler, ready to start watching blocks.
pub struct Scheduler {
    pub processor: Arc<Processor>,
    pub repository: FileRepository,
    watchers: Vec<BlockWatcher>,
    flush_interval: Duration,
}

impl Scheduler {
    pub fn assemble(
        config: &SchedulerConfig,
        chains: ChainRegistry,
        repository: FileRepository,
        gas_oracle: Arc<dyn GasOracle>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let executor = config.chains.iter().fold(
            TransactionExecutor::new(
                chains.clone(),
                gas_oracle,
                Arc::clone(&notifier),
                InFlightSet::new(),
                config.executor.clone(),
            ),
            |executor, chain| executor.with_native_symbol(ChainId(chain.chain_id), chain.native_symbol.clone()),
        );

        let processor = Arc::new(Processor::new(
            Arc::new(repository.clone()),
            executor,
            notifier,
            chains.clone(),
        ));

        let watchers = config
            .chains
            .iter()
            .filter_map(|chain| {
                let client = chains.get(ChainId(chain.chain_id)).ok()?;
                Some(BlockWatcher::new(
                    client,
                    Arc::clone(&processor),
                    Duration::from_millis(chain.poll_interval_ms),
                ))
            })
            .collect();

        Self {
            processor,
            repository,
            watchers,
            flush_interval: Duration::from_millis(config.storage.flush_interval_ms),
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Start every watcher, plus the store flusher, as tasks bound to `shutdown`.
    pub fn spawn_tasks(&mut self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let mut tasks: Vec<_> = self
            .watchers
            .drain(..)
            .map(|watcher| tokio::spawn(watcher.run(shutdown.subscribe())))
            .collect();
        tasks.push(
            self.repository
                .spawn_flusher(self.flush_interval, shutdown.subscribe()),
        );
        tasks
    }
}
