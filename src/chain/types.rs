//! Chain-specific types and error definitions.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::schema::ChainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during chain operations.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// No client is configured for the chain.
    #[error("No client configured for chain {0}")]
    UnknownChain(ChainId),

    /// The raw signed transaction could not be decoded.
    #[error("Invalid signed transaction: {0}")]
    InvalidTransaction(String),

    /// Transaction did not reach the required depth within the poll budget.
    #[error("Transaction {hash} not confirmed after {polls} polls")]
    ConfirmationBudgetExhausted { hash: TxHash, polls: u32 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

impl ChainError {
    /// Whether the error message carries one of the given transient signatures.
    pub fn is_transient(&self, signatures: &[String]) -> bool {
        match self {
            ChainError::Rpc(message) => {
                let message = message.to_lowercase();
                signatures
                    .iter()
                    .any(|sig| message.contains(&sig.to_lowercase()))
            }
            _ => false,
        }
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Minimal view of a transaction known to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: TxHash,
    /// Block the transaction was included in, `None` while in the mempool.
    pub block_number: Option<u64>,
}

/// Receipt fields the scheduler cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    /// `true` when the receipt status is 1.
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}
