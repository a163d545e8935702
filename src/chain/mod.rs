//! Chain integration subsystem.
//!
//! # Data Flow
//! ```text
//! [[chains]] config (RPC URL, failovers, timeouts)
//!     → evm.rs (alloy providers, failover, confirmation polling)
//!     → retry.rs (bounded retry on lagging-node errors)
//!     → client.rs (ChainClient trait, per-chain registry)
//!     → executor / watcher / gas oracle
//! ```
//!
//! # Constraints
//! - Every RPC call has a per-request timeout
//! - The scheduler never signs: it only broadcasts pre-signed bytes
//! - Errors carry the node's message so transient signatures can be matched

pub mod client;
pub mod evm;
pub mod retry;
pub mod types;

pub use client::{ChainClient, ChainRegistry};
pub use evm::EvmChainClient;
pub use retry::{retry_transient, RetryPolicy, RetryingClient};
pub use types::{ChainConfig, ChainError, ChainId, ChainResult, ChainTransaction, TxReceipt};
