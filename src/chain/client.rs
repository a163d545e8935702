//! The RPC surface the scheduler needs from a chain, and the per-chain registry.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::types::{ChainError, ChainId, ChainResult, ChainTransaction, TxReceipt};

/// Per-chain RPC operations used by the executor and watcher.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain this client talks to.
    fn chain_id(&self) -> ChainId;

    async fn get_block_number(&self) -> ChainResult<u64>;

    /// Number of transactions mined from `address`, i.e. the next usable nonce.
    async fn get_transaction_count(&self, address: Address) -> ChainResult<u64>;

    async fn get_transaction(&self, hash: TxHash) -> ChainResult<Option<ChainTransaction>>;

    async fn get_transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TxReceipt>>;

    async fn send_raw_transaction(&self, raw: &Bytes) -> ChainResult<TxHash>;

    /// Wait until `hash` is buried under `confirmations` blocks and return its receipt.
    async fn wait_for_confirmations(&self, hash: TxHash, confirmations: u64)
        -> ChainResult<TxReceipt>;

    async fn get_balance(&self, address: Address) -> ChainResult<U256>;

    async fn get_token_balance(&self, token: Address, address: Address) -> ChainResult<U256>;

    /// Current network gas price in wei.
    async fn get_gas_price(&self) -> ChainResult<u128>;
}

/// Lookup table from chain id to its client.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    clients: HashMap<ChainId, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own chain id, replacing any previous one.
    pub fn insert(&mut self, client: Arc<dyn ChainClient>) {
        self.clients.insert(client.chain_id(), client);
    }

    pub fn get(&self, chain_id: ChainId) -> ChainResult<Arc<dyn ChainClient>> {
        self.clients
            .get(&chain_id)
            .cloned()
            .ok_or(ChainError::UnknownChain(chain_id))
    }

    /// Chain ids with a registered client, ascending.
    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<_> = self.clients.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("chains", &self.chain_ids())
            .finish()
    }
}
