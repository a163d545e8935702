//! Outcome of one `execute` call.

use alloy::primitives::{TxHash, U256};
use chrono::{DateTime, Utc};

use crate::schedule::TransactionStatus;

/// Resolved description of what a confirmed transaction moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub name: String,
    pub amount: U256,
    /// Amount in whole units, when the decimals are known.
    pub value: Option<String>,
}

/// Ephemeral result merged into the stored record by the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub status: TransactionStatus,
    /// This candidate owns its nonce slot (possibly still confirming).
    pub condition_met: bool,
    pub transaction_hash: Option<TxHash>,
    pub error: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    /// Set when the release conditions were first observed true.
    pub condition_block: Option<u64>,
    pub execution_attempts: Option<u32>,
    pub last_execution_attempt: Option<DateTime<Utc>>,
    pub gas_price_notified_at: Option<DateTime<Utc>>,
    pub asset: Option<AssetMetadata>,
    pub gas_paid: Option<U256>,
    pub gas_saved: Option<U256>,
}

impl ExecutionResult {
    fn with_status(status: TransactionStatus, condition_met: bool) -> Self {
        Self {
            status,
            condition_met,
            transaction_hash: None,
            error: None,
            executed_at: None,
            condition_block: None,
            execution_attempts: None,
            last_execution_attempt: None,
            gas_price_notified_at: None,
            asset: None,
            gas_paid: None,
            gas_saved: None,
        }
    }

    /// Not eligible yet.
    pub fn pending() -> Self {
        Self::with_status(TransactionStatus::Pending, false)
    }

    /// Chosen for its slot, waiting on confirmations.
    pub fn chosen() -> Self {
        Self::with_status(TransactionStatus::Pending, true)
    }

    /// Conditions observed true for the first time at `block`.
    pub fn chosen_at(block: u64) -> Self {
        Self {
            condition_block: Some(block),
            ..Self::chosen()
        }
    }

    pub fn stale() -> Self {
        Self::with_status(TransactionStatus::StaleNonce, false)
    }

    pub fn completed(hash: TxHash, at: DateTime<Utc>) -> Self {
        Self {
            transaction_hash: Some(hash),
            executed_at: Some(at),
            ..Self::with_status(TransactionStatus::Completed, true)
        }
    }

    pub fn failed(error: impl Into<String>, hash: Option<TxHash>) -> Self {
        Self {
            transaction_hash: hash,
            error: Some(error.into()),
            ..Self::with_status(TransactionStatus::Error, true)
        }
    }

    /// Mark the result as reconciliation of a slot someone else consumed.
    pub fn not_chosen(mut self) -> Self {
        self.condition_met = false;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
