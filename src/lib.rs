//! Conditional transaction scheduler library.
//!
//! Holds pre-signed EVM transactions and broadcasts each one once its
//! release conditions (time, balance, gas price) hold, one nonce slot at a
//! time per sender.

// Chain access
pub mod chain;
pub mod gas;

// Scheduling core
pub mod executor;
pub mod processor;
pub mod schedule;
pub mod watcher;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod notify;
pub mod observability;

pub use config::SchedulerConfig;
pub use executor::TransactionExecutor;
pub use lifecycle::Shutdown;
pub use processor::Processor;
