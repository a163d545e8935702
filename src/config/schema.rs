//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the scheduler.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the scheduler service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Chains to watch, one block watcher each.
    pub chains: Vec<ChainConfig>,

    /// Gate and broadcast behaviour.
    pub executor: ExecutorConfig,

    /// Transient RPC error retry policy.
    pub retry: RetryConfig,

    /// Record store settings.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Per-chain connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Human-readable chain name for logs.
    pub name: String,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Block polling interval for the watcher and confirmation waits.
    pub poll_interval_ms: u64,

    /// Receipt polls before a confirmation wait gives up until the next tick.
    pub max_confirmation_polls: u32,

    /// Symbol of the native currency, used for asset metadata.
    pub native_symbol: String,

    /// Optional gas price feed returning JSON.
    pub gas_oracle_url: Option<String>,

    /// JSON pointer to the safe-low price (in gwei) inside the feed document.
    pub gas_oracle_pointer: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: "mainnet".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            poll_interval_ms: 4000,
            max_confirmation_polls: 120,
            native_symbol: "ETH".to_string(),
            gas_oracle_url: None,
            gas_oracle_pointer: "/result/SafeGasPrice".to_string(),
        }
    }
}

/// Transaction executor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Blocks to wait after a condition is met and after inclusion.
    pub confirmations: u64,

    /// Synthesize successful outcomes instead of broadcasting.
    pub dry_run: bool,

    /// Minimum seconds between delayed-gas-price notifications per transaction.
    pub gas_notification_interval_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            confirmations: 3,
            dry_run: false,
            gas_notification_interval_secs: 15 * 60,
        }
    }
}

/// Retry configuration for transient RPC errors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Fixed delay between attempts in milliseconds.
    pub delay_ms: u64,

    /// Error message fragments that mark an RPC failure as transient.
    pub transient_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 20,
            delay_ms: 500,
            transient_errors: vec!["unsupported block number".to_string()],
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding scheduled transactions.
    pub path: String,

    /// How often pending changes are written to `path`.
    pub flush_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "scheduled_transactions.json".to_string(),
            flush_interval_ms: 1000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
