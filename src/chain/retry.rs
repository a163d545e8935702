//! Bounded retry for RPC nodes lagging behind the chain head.
//!
//! Public endpoints behind load balancers occasionally answer with
//! "unsupported block number" when a request lands on a node that has not
//! yet seen the block another node just reported. Such errors are retried
//! a fixed number of times with a fixed delay. Anything else propagates.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::client::ChainClient;
use crate::chain::types::{ChainId, ChainResult, ChainTransaction, TxReceipt};
use crate::config::schema::RetryConfig;
use crate::observability::metrics;

/// Retry parameters shared by every wrapped call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay: Duration,
    /// Case-insensitive substrings marking an error as transient.
    pub transient_errors: Vec<String>,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.delay_ms),
            transient_errors: config.transient_errors.clone(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Run `call` until it succeeds, fails with a non-transient error, or the
/// retry budget is spent.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, op: &'static str, call: F) -> ChainResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && e.is_transient(&policy.transient_errors) => {
                attempt += 1;
                metrics::record_rpc_retry(op);
                tracing::debug!(op, attempt, error = %e, "Transient RPC error, retrying");
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A [`ChainClient`] that applies [`retry_transient`] to every call of the
/// client it wraps.
#[derive(Clone)]
pub struct RetryingClient {
    inner: Arc<dyn ChainClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ChainClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl ChainClient for RetryingClient {
    fn chain_id(&self) -> ChainId {
        self.inner.chain_id()
    }

    async fn get_block_number(&self) -> ChainResult<u64> {
        retry_transient(&self.policy, "get_block_number", || self.inner.get_block_number()).await
    }

    async fn get_transaction_count(&self, address: Address) -> ChainResult<u64> {
        retry_transient(&self.policy, "get_transaction_count", || {
            self.inner.get_transaction_count(address)
        })
        .await
    }

    async fn get_transaction(&self, hash: TxHash) -> ChainResult<Option<ChainTransaction>> {
        retry_transient(&self.policy, "get_transaction", || self.inner.get_transaction(hash)).await
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TxReceipt>> {
        retry_transient(&self.policy, "get_transaction_receipt", || {
            self.inner.get_transaction_receipt(hash)
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> ChainResult<TxHash> {
        retry_transient(&self.policy, "send_raw_transaction", || {
            self.inner.send_raw_transaction(raw)
        })
        .await
    }

    async fn wait_for_confirmations(
        &self,
        hash: TxHash,
        confirmations: u64,
    ) -> ChainResult<TxReceipt> {
        retry_transient(&self.policy, "wait_for_confirmations", || {
            self.inner.wait_for_confirmations(hash, confirmations)
        })
        .await
    }

    async fn get_balance(&self, address: Address) -> ChainResult<U256> {
        retry_transient(&self.policy, "get_balance", || self.inner.get_balance(address)).await
    }

    async fn get_token_balance(&self, token: Address, address: Address) -> ChainResult<U256> {
        retry_transient(&self.policy, "get_token_balance", || {
            self.inner.get_token_balance(token, address)
        })
        .await
    }

    async fn get_gas_price(&self) -> ChainResult<u128> {
        retry_transient(&self.policy, "get_gas_price", || self.inner.get_gas_price()).await
    }
}
