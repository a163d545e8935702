//! EVM JSON-RPC client with failover, timeouts and confirmation polling.
//!
//! # Responsibilities
//! - Connect to the primary and failover JSON-RPC endpoints
//! - Query chain state (block number, nonces, balances, receipts)
//! - Broadcast raw signed transactions
//! - Poll receipts until the required confirmation depth is reached

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout};

use crate::chain::client::ChainClient;
use crate::chain::types::{
    ChainConfig, ChainError, ChainId, ChainResult, ChainTransaction, TxReceipt,
};

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
    }
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Alloy-backed [`ChainClient`] with failover support.
#[derive(Clone)]
pub struct EvmChainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    config: ChainConfig,
    timeout_duration: Duration,
}

impl EvmChainClient {
    /// Create a new client for one configured chain.
    ///
    /// An unreachable endpoint does not fail construction; a malformed
    /// primary URL or an endpoint serving another chain does.
    pub async fn new(config: ChainConfig) -> ChainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let client = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => tracing::info!(
                chain = %config.name,
                chain_id = config.chain_id,
                rpc_url = %config.rpc_url,
                "Chain client initialized"
            ),
            Err(e @ ChainError::ChainMismatch { .. }) => return Err(e),
            Err(e) => tracing::warn!(
                chain = %config.name,
                error = %e,
                "Chain client initialized but chain verification failed"
            ),
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        let actual = self
            .with_failover("get_chain_id", |p| async move { p.get_chain_id().await })
            .await?;
        if actual != self.config.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }
        Ok(())
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run `call` against each provider in turn until one answers in time.
    async fn with_failover<T, F, Fut>(&self, op: &'static str, call: F) -> ChainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut last_error = ChainError::Rpc(format!("No RPC providers available for {op}"));
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, op, error = %e, "RPC error");
                    last_error = ChainError::Rpc(e.to_string());
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, op, "RPC timeout");
                    last_error = ChainError::Timeout(self.config.rpc_timeout_secs);
                }
            }
        }
        Err(last_error)
    }
}

fn to_receipt(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        hash: receipt.transaction_hash,
        success: receipt.status(),
        block_number: receipt.block_number,
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn chain_id(&self) -> ChainId {
        ChainId(self.config.chain_id)
    }

    async fn get_block_number(&self) -> ChainResult<u64> {
        self.with_failover("get_block_number", |p| async move { p.get_block_number().await })
            .await
    }

    async fn get_transaction_count(&self, address: Address) -> ChainResult<u64> {
        self.with_failover("get_transaction_count", |p| async move {
            p.get_transaction_count(address).await
        })
        .await
    }

    async fn get_transaction(&self, hash: TxHash) -> ChainResult<Option<ChainTransaction>> {
        let tx = self
            .with_failover("get_transaction_by_hash", |p| async move {
                p.get_transaction_by_hash(hash).await
            })
            .await?;
        Ok(tx.map(|tx| ChainTransaction {
            hash,
            block_number: tx.block_number,
        }))
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TxReceipt>> {
        let receipt = self
            .with_failover("get_transaction_receipt", |p| async move {
                p.get_transaction_receipt(hash).await
            })
            .await?;
        Ok(receipt.as_ref().map(to_receipt))
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> ChainResult<TxHash> {
        self.with_failover("send_raw_transaction", |p| {
            let raw = raw.clone();
            async move {
                let pending = p.send_raw_transaction(&raw).await?;
                Ok::<_, TransportError>(*pending.tx_hash())
            }
        })
        .await
    }

    async fn wait_for_confirmations(
        &self,
        hash: TxHash,
        confirmations: u64,
    ) -> ChainResult<TxReceipt> {
        let polls = self.config.max_confirmation_polls;
        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms));

        for _ in 0..polls {
            ticker.tick().await;

            let receipt = match self.get_transaction_receipt(hash).await? {
                Some(r) => r,
                None => {
                    tracing::debug!(tx_hash = %hash, "Transaction pending");
                    continue;
                }
            };

            // A reverted transaction is final regardless of depth.
            if !receipt.success {
                return Ok(receipt);
            }

            let current_block = self.get_block_number().await?;
            let tx_block = receipt.block_number.unwrap_or(current_block);
            let depth = current_block.saturating_sub(tx_block);

            if depth >= confirmations {
                return Ok(receipt);
            }

            tracing::debug!(
                tx_hash = %hash,
                confirmations = depth,
                required = confirmations,
                "Waiting for confirmations"
            );
        }

        Err(ChainError::ConfirmationBudgetExhausted { hash, polls })
    }

    async fn get_balance(&self, address: Address) -> ChainResult<U256> {
        self.with_failover("get_balance", |p| async move { p.get_balance(address).await })
            .await
    }

    async fn get_token_balance(&self, token: Address, address: Address) -> ChainResult<U256> {
        let calldata = IERC20::balanceOfCall { owner: address }.abi_encode();
        let output = self
            .with_failover("eth_call balanceOf", |p| {
                let request = TransactionRequest::default()
                    .with_to(token)
                    .with_input(calldata.clone());
                async move { p.call(request).await }
            })
            .await?;

        IERC20::balanceOfCall::abi_decode_returns(&output)
            .map_err(|e| ChainError::Rpc(format!("Malformed balanceOf response: {e}")))
    }

    async fn get_gas_price(&self) -> ChainResult<u128> {
        self.with_failover("get_gas_price", |p| async move { p.get_gas_price().await })
            .await
    }
}

impl std::fmt::Debug for EvmChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmChainClient")
            .field("chain", &self.config.name)
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}
