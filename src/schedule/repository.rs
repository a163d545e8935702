//! Storage contract for scheduled transactions.

use async_trait::async_trait;
use thiserror::Error;

use crate::chain::ChainId;
use crate::schedule::types::{RecordUpdate, ScheduledTransaction};

/// Errors surfaced by a schedule store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage encoding error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Scheduled transaction {0} not found")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Restricts a query to the chains one scheduler instance serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFilter {
    /// Empty means every chain.
    pub chain_ids: Vec<ChainId>,
}

impl ScheduleFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn chain(chain_id: ChainId) -> Self {
        Self {
            chain_ids: vec![chain_id],
        }
    }

    pub fn matches(&self, record: &ScheduledTransaction) -> bool {
        self.chain_ids.is_empty() || self.chain_ids.contains(&record.chain_id)
    }
}

/// CRUD over scheduled transaction records.
///
/// The pending query is the canonical place where Cancelled and other
/// terminal records are filtered out.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Non-terminal records: Pending, and StaleNonce awaiting reconciliation.
    async fn get_pending(&self, filter: &ScheduleFilter) -> RepositoryResult<Vec<ScheduledTransaction>>;

    /// Records with the given ids, whatever their status. Unknown ids are skipped.
    async fn get_by_ids(
        &self,
        filter: &ScheduleFilter,
        ids: &[String],
    ) -> RepositoryResult<Vec<ScheduledTransaction>>;

    async fn update(&self, id: &str, update: &RecordUpdate) -> RepositoryResult<()>;

    /// Store a new record, or fold it into an existing one with the same
    /// signed transaction. Returns the stored record with its id.
    async fn save(&self, record: ScheduledTransaction) -> RepositoryResult<ScheduledTransaction>;
}
