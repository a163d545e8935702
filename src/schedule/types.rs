//! Persisted scheduled-transaction records.

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;

/// Lifecycle state of a scheduled transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Waiting for its nonce slot and release conditions.
    Pending,
    /// Broadcast and confirmed with a successful receipt.
    Completed,
    /// Broadcast failed or the receipt reports a revert.
    Error,
    /// Withdrawn by the user; excluded from the pending set.
    Cancelled,
    /// Another transaction filled this nonce slot first.
    StaleNonce,
}

impl TransactionStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Whether the record still competes for its nonce slot.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::StaleNonce => "stale_nonce",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pre-signed transaction waiting for its release conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTransaction {
    /// Store-assigned identifier; empty until saved.
    pub id: String,
    pub chain_id: ChainId,
    pub sender: Address,
    pub nonce: u64,
    /// Tie-break among records competing for one nonce slot; lower is tried first.
    pub priority: i64,
    pub signed_transaction: Bytes,
    pub transaction_hash: TxHash,

    /// Token contract address, or a native symbol / `None` for the native balance.
    pub condition_asset: Option<String>,
    pub condition_amount: Option<U256>,
    pub time_condition: Option<DateTime<Utc>>,
    /// IANA zone the user expressed `time_condition` in, kept for display.
    pub time_condition_tz: Option<String>,
    pub gas_price_aware: bool,

    pub status: TransactionStatus,
    /// Block where the release condition was first seen true; 0 when unset.
    pub condition_block: u64,
    pub execution_attempts: u32,
    pub last_execution_attempt: Option<DateTime<Utc>>,
    pub gas_price_notified_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,

    pub asset_name: Option<String>,
    pub asset_amount: Option<U256>,
    pub asset_value: Option<String>,
    pub gas_paid: Option<U256>,
    pub gas_saved: Option<U256>,

    pub created_at: DateTime<Utc>,
}

impl ScheduledTransaction {
    /// A fresh Pending record with no conditions.
    pub fn new(chain_id: ChainId, sender: Address, nonce: u64, signed_transaction: Bytes) -> Self {
        let transaction_hash = keccak256(&signed_transaction);
        Self {
            id: String::new(),
            chain_id,
            sender,
            nonce,
            priority: 0,
            signed_transaction,
            transaction_hash,
            condition_asset: None,
            condition_amount: None,
            time_condition: None,
            time_condition_tz: None,
            gas_price_aware: false,
            status: TransactionStatus::Pending,
            condition_block: 0,
            execution_attempts: 0,
            last_execution_attempt: None,
            gas_price_notified_at: None,
            error: None,
            executed_at: None,
            asset_name: None,
            asset_amount: None,
            asset_value: None,
            gas_paid: None,
            gas_saved: None,
            created_at: Utc::now(),
        }
    }

    /// Token contract to read the balance from, if the condition asset is one.
    pub fn condition_token(&self) -> Option<Address> {
        self.condition_asset
            .as_deref()
            .and_then(|asset| asset.parse::<Address>().ok())
    }

    /// Whether `other` is the same signed transaction for the same slot.
    pub fn same_intent(&self, other: &ScheduledTransaction) -> bool {
        self.chain_id == other.chain_id
            && self.sender == other.sender
            && self.nonce == other.nonce
            && self.transaction_hash == other.transaction_hash
    }

    /// Copy the user-controlled condition fields from a newer request.
    pub fn overwrite_conditions(&mut self, newer: &ScheduledTransaction) {
        self.priority = newer.priority;
        self.condition_asset = newer.condition_asset.clone();
        self.condition_amount = newer.condition_amount;
        self.time_condition = newer.time_condition;
        self.time_condition_tz = newer.time_condition_tz.clone();
        self.gas_price_aware = newer.gas_price_aware;
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &RecordUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(hash) = update.transaction_hash {
            self.transaction_hash = hash;
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        if let Some(at) = update.executed_at {
            self.executed_at = Some(at);
        }
        if let Some(block) = update.condition_block {
            self.condition_block = block;
        }
        if let Some(attempts) = update.execution_attempts {
            self.execution_attempts = attempts;
        }
        if let Some(at) = update.last_execution_attempt {
            self.last_execution_attempt = Some(at);
        }
        if let Some(at) = update.gas_price_notified_at {
            self.gas_price_notified_at = Some(at);
        }
        if let Some(name) = &update.asset_name {
            self.asset_name = Some(name.clone());
        }
        if let Some(amount) = update.asset_amount {
            self.asset_amount = Some(amount);
        }
        if let Some(value) = &update.asset_value {
            self.asset_value = Some(value.clone());
        }
        if let Some(paid) = update.gas_paid {
            self.gas_paid = Some(paid);
        }
        if let Some(saved) = update.gas_saved {
            self.gas_saved = Some(saved);
        }
    }
}

/// A partial set of record fields to persist. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub status: Option<TransactionStatus>,
    pub transaction_hash: Option<TxHash>,
    pub error: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub condition_block: Option<u64>,
    pub execution_attempts: Option<u32>,
    pub last_execution_attempt: Option<DateTime<Utc>>,
    pub gas_price_notified_at: Option<DateTime<Utc>>,
    pub asset_name: Option<String>,
    pub asset_amount: Option<U256>,
    pub asset_value: Option<String>,
    pub gas_paid: Option<U256>,
    pub gas_saved: Option<U256>,
}

impl RecordUpdate {
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
