//! Per-chain block watcher.
//!
//! # Data Flow
//! ```text
//! ticker (poll_interval_ms)
//!     → ChainClient::get_block_number (retrying client)
//!     → new head? spawn Processor::process(chain, head)
//! shutdown signal → stop polling → wait for spawned ticks
//! ```
//!
//! # Design Decisions
//! - Each tick runs as its own task so a slow confirmation wait never
//!   delays observing the next block
//! - Overlapping ticks are safe because the executor skips ids in flight
//! - Only the newest head is processed when several blocks arrive at once

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};

use crate::chain::{ChainClient, ChainId};
use crate::processor::Processor;

pub struct BlockWatcher {
    chain_id: ChainId,
    client: Arc<dyn ChainClient>,
    processor: Arc<Processor>,
    poll_interval: Duration,
    last_head: Option<u64>,
}

impl BlockWatcher {
    pub fn new(client: Arc<dyn ChainClient>, processor: Arc<Processor>, poll_interval: Duration) -> Self {
        Self {
            chain_id: client.chain_id(),
            client,
            processor,
            poll_interval,
            last_head: None,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn last_head(&self) -> Option<u64> {
        self.last_head
    }

    /// Read the head and return it if it is newer than the last one seen.
    pub async fn poll_head(&mut self) -> Option<u64> {
        match self.client.get_block_number().await {
            Ok(head) if self.last_head.map_or(true, |last| head > last) => {
                self.last_head = Some(head);
                Some(head)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(chain_id = %self.chain_id, error = %e, "Failed to read block number");
                None
            }
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            chain_id = %self.chain_id,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Block watcher starting"
        );

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while ticks.try_join_next().is_some() {}

                    if let Some(head) = self.poll_head().await {
                        tracing::debug!(chain_id = %self.chain_id, block = head, "New block");
                        let processor = Arc::clone(&self.processor);
                        let chain_id = self.chain_id;
                        ticks.spawn(async move { processor.process(chain_id, head).await });
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!(chain_id = %self.chain_id, "Block watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        while ticks.join_next().await.is_some() {}
        tracing::info!(chain_id = %self.chain_id, "Block watcher stopped");
    }
}
