//! Block-triggered coordinator.
//!
//! # Data Flow
//! ```text
//! process(chain, block) / process_by_ids(ids)
//!     → ScheduleRepository (pending set, or records by id)
//!     → partition by chain     (concurrent)
//!         → partition by sender (concurrent)
//!             → StaleNonce records: reconcile only
//!             → lowest Pending nonce group, ascending priority (sequential)
//!                 → TransactionExecutor::execute
//!                 → merge.rs → ScheduleRepository::update → notify
//! ```
//!
//! # Design Decisions
//! - Neither entry point returns an error; failures are logged per group
//! - One sender's failure never aborts another sender, chain or tick
//! - Only the lowest outstanding nonce of a sender is attempted, so N+1 is
//!   never broadcast before N resolves
//! - Stale records are re-checked every tick so a slot they filled after
//!   all still resolves to Completed or Error

pub mod merge;

use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::chain::{ChainClient, ChainError, ChainId, ChainRegistry};
use crate::executor::{ExecuteError, ExecutionResult, TransactionExecutor};
use crate::notify::{self, NotificationSink};
use crate::observability::metrics;
use crate::schedule::{
    RecordUpdate, RepositoryError, ScheduleFilter, ScheduleRepository, ScheduledTransaction,
    TransactionStatus,
};

pub use merge::{merge, Merge};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

pub struct Processor {
    repository: Arc<dyn ScheduleRepository>,
    executor: TransactionExecutor,
    notifier: Arc<dyn NotificationSink>,
    chains: ChainRegistry,
    filter: ScheduleFilter,
}

impl Processor {
    pub fn new(
        repository: Arc<dyn ScheduleRepository>,
        executor: TransactionExecutor,
        notifier: Arc<dyn NotificationSink>,
        chains: ChainRegistry,
    ) -> Self {
        let filter = ScheduleFilter {
            chain_ids: chains.chain_ids(),
        };
        Self {
            repository,
            executor,
            notifier,
            chains,
            filter,
        }
    }

    pub fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    /// One tick for `chain_id` at head `block_number`.
    pub async fn process(&self, chain_id: ChainId, block_number: u64) {
        metrics::record_tick(chain_id);
        tracing::debug!(chain_id = %chain_id, block = block_number, "Processing tick");

        if let Err(e) = self.process_chain_tick(chain_id, block_number).await {
            metrics::record_tick_error(chain_id);
            tracing::error!(
                chain_id = %chain_id,
                block = block_number,
                error = %e,
                "Tick failed"
            );
        }
    }

    async fn process_chain_tick(&self, chain_id: ChainId, block_number: u64) -> Result<(), ProcessError> {
        let records = self
            .repository
            .get_pending(&ScheduleFilter::chain(chain_id))
            .await?;
        metrics::set_pending(chain_id, records.len());
        if records.is_empty() {
            return Ok(());
        }

        let heads = HashMap::from([(chain_id, block_number)]);
        self.process_records(records, &heads).await;
        Ok(())
    }

    /// Re-run the pipeline for specific records, at each chain's current head.
    pub async fn process_by_ids(&self, ids: &[String]) {
        if let Err(e) = self.process_ids(ids).await {
            tracing::error!(ids = ?ids, error = %e, "Reprocessing failed");
        }
    }

    async fn process_ids(&self, ids: &[String]) -> Result<(), ProcessError> {
        let requested: Vec<_> = self
            .repository
            .get_by_ids(&self.filter, ids)
            .await?
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .collect();
        if requested.is_empty() {
            tracing::info!(ids = ?ids, "Nothing to reprocess");
            return Ok(());
        }

        let mut heads = HashMap::new();
        let chain_ids: BTreeSet<ChainId> = requested.iter().map(|r| r.chain_id).collect();
        for chain_id in chain_ids {
            match self.head(chain_id).await {
                Ok(block) => {
                    heads.insert(chain_id, block);
                }
                Err(e) => tracing::error!(
                    chain_id = %chain_id,
                    error = %e,
                    "Could not read chain head, skipping chain"
                ),
            }
        }

        // Siblings come from the whole pending set, not just the requested ids.
        let pending = self.repository.get_pending(&self.filter).await?;
        let (stale, live): (Vec<_>, Vec<_>) = requested
            .into_iter()
            .partition(|r| r.status == TransactionStatus::StaleNonce);

        for record in &stale {
            if let Some(&block) = heads.get(&record.chain_id) {
                self.reconcile(block, record).await;
            }
        }

        let slots = partition(live, |r| (r.chain_id, r.sender, r.nonce));
        for ((chain_id, sender, nonce), mut candidates) in slots {
            let Some(&block) = heads.get(&chain_id) else {
                continue;
            };
            candidates.sort_by_key(|r| (r.priority, r.created_at));
            let slot: Vec<_> = pending
                .iter()
                .filter(|p| {
                    p.chain_id == chain_id
                        && p.sender == sender
                        && p.nonce == nonce
                        && p.status.is_pending()
                })
                .cloned()
                .collect();

            if let Err(e) = self.process_nonce_group(block, &candidates, &slot).await {
                tracing::error!(
                    chain_id = %chain_id,
                    sender = %sender,
                    nonce,
                    error = %e,
                    "Reprocessing slot failed"
                );
            }
        }
        Ok(())
    }

    async fn head(&self, chain_id: ChainId) -> Result<u64, ProcessError> {
        Ok(self.chains.get(chain_id)?.get_block_number().await?)
    }

    async fn process_records(&self, records: Vec<ScheduledTransaction>, heads: &HashMap<ChainId, u64>) {
        let chains = partition(records, |r| r.chain_id);

        join_all(chains.into_iter().filter_map(|(chain_id, records)| {
            heads
                .get(&chain_id)
                .map(|&block| self.process_chain(chain_id, block, records))
        }))
        .await;
    }

    async fn process_chain(&self, chain_id: ChainId, block_number: u64, records: Vec<ScheduledTransaction>) {
        let senders = partition(records, |r| r.sender);

        join_all(senders.into_iter().map(|(sender, records)| async move {
            if let Err(e) = self.process_sender(block_number, records).await {
                tracing::error!(
                    chain_id = %chain_id,
                    sender = %sender,
                    error = %e,
                    "Sender processing failed"
                );
            }
        }))
        .await;
    }

    async fn process_sender(&self, block_number: u64, records: Vec<ScheduledTransaction>) -> Result<(), ProcessError> {
        let (stale, live): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| r.status == TransactionStatus::StaleNonce);

        for record in &stale {
            self.reconcile(block_number, record).await;
        }

        let mut nonces = partition(live, |r| r.nonce);
        let Some((_, mut group)) = nonces.pop_first() else {
            return Ok(());
        };
        group.sort_by_key(|r| (r.priority, r.created_at));
        self.process_nonce_group(block_number, &group, &group).await
    }

    /// Check whether a stale record's own transaction ended up on chain.
    async fn reconcile(&self, block_number: u64, record: &ScheduledTransaction) {
        let outcome = match self.executor.execute(record, block_number, &[]).await {
            Ok(result) => self.persist(record, &result).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            tracing::warn!(tx_id = %record.id, error = %e, "Reconciling stale transaction failed");
        }
    }

    /// Walk `candidates` in order until one owns the slot.
    ///
    /// `slot` holds every Pending record for the same nonce; each candidate
    /// sees the rest of it as siblings.
    async fn process_nonce_group(
        &self,
        block_number: u64,
        candidates: &[ScheduledTransaction],
        slot: &[ScheduledTransaction],
    ) -> Result<(), ProcessError> {
        for record in candidates {
            let siblings: Vec<_> = slot.iter().filter(|s| s.id != record.id).cloned().collect();

            let result = self.executor.execute(record, block_number, &siblings).await?;
            self.persist(record, &result).await?;

            if result.is_terminal() || result.condition_met {
                self.stale_siblings(record, &siblings).await?;
                break;
            }
        }
        Ok(())
    }

    async fn stale_siblings(
        &self,
        winner: &ScheduledTransaction,
        siblings: &[ScheduledTransaction],
    ) -> Result<(), ProcessError> {
        let update = RecordUpdate::status(TransactionStatus::StaleNonce);
        for sibling in siblings.iter().filter(|s| s.status.is_pending()) {
            self.repository.update(&sibling.id, &update).await?;
            metrics::record_outcome(sibling.chain_id, TransactionStatus::StaleNonce);
            tracing::info!(
                tx_id = %sibling.id,
                winner = %winner.id,
                nonce = sibling.nonce,
                "Marked stale, nonce taken by another transaction"
            );
        }
        Ok(())
    }

    async fn persist(&self, record: &ScheduledTransaction, result: &ExecutionResult) -> Result<(), ProcessError> {
        let Merge { update, notify: kind } = merge(record, result);
        if update.is_empty() {
            return Ok(());
        }

        self.repository.update(&record.id, &update).await?;

        if let Some(status) = update.status {
            metrics::record_outcome(record.chain_id, status);
            tracing::info!(
                tx_id = %record.id,
                chain_id = %record.chain_id,
                status = %status,
                tx_hash = ?update.transaction_hash,
                error = ?update.error,
                "Transaction status changed"
            );
        }

        if let Some(kind) = kind {
            let mut applied = record.clone();
            applied.apply(&update);
            notify::dispatch(&self.notifier, kind, applied);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("executor", &self.executor)
            .field("filter", &self.filter)
            .finish()
    }
}

/// Group records by `key`, ordered by key.
fn partition<K, I, F>(records: I, key: F) -> BTreeMap<K, Vec<ScheduledTransaction>>
where
    K: Ord,
    I: IntoIterator<Item = ScheduledTransaction>,
    F: Fn(&ScheduledTransaction) -> K,
{
    let mut groups: BTreeMap<K, Vec<ScheduledTransaction>> = BTreeMap::new();
    for record in records {
        groups.entry(key(&record)).or_default().push(record);
    }
    groups
}
