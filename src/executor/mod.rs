//! Gate evaluation, broadcast and confirmation for one scheduled transaction.
//!
//! # Data Flow
//! ```text
//! execute(record, block, siblings)
//!     → inflight.rs (skip if this id is already executing)
//!     → Candidate (decode raw bytes)
//!     → StaleNonce: reconcile against the chain only, never broadcast
//!     → gates.rs (confirmation wait → already posted → nonce → time → amount → gas)
//!     → first sighting: remember condition block, wait CONFIRMATIONS blocks
//!     → broadcast (or dry-run) → wait for confirmations → ExecutionResult
//! ```

pub mod gates;
pub mod inflight;
pub mod result;

use alloy::primitives::utils::format_units;
use alloy::primitives::{TxHash, U256};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::chain::{ChainClient, ChainError, ChainId, ChainRegistry, TxReceipt};
use crate::config::ExecutorConfig;
use crate::gas::{GasOracle, GasOracleError};
use crate::notify::{self, NotificationKind, NotificationSink};
use crate::observability::metrics;
use crate::schedule::{Candidate, ScheduledTransaction, TransactionStatus, Transfer};

pub use gates::{Gate, GateContext, GateOutcome};
pub use inflight::{InFlightGuard, InFlightSet};
pub use result::{AssetMetadata, ExecutionResult};

/// Errors that abort one `execute` call. Gate failures are not errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    GasOracle(#[from] GasOracleError),
}

/// Runs the gate chain for a transaction and broadcasts it when all pass.
#[derive(Clone)]
pub struct TransactionExecutor {
    chains: ChainRegistry,
    gas_oracle: Arc<dyn GasOracle>,
    notifier: Arc<dyn NotificationSink>,
    in_flight: InFlightSet,
    config: ExecutorConfig,
    native_symbols: HashMap<ChainId, String>,
}

impl TransactionExecutor {
    pub fn new(
        chains: ChainRegistry,
        gas_oracle: Arc<dyn GasOracle>,
        notifier: Arc<dyn NotificationSink>,
        in_flight: InFlightSet,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            chains,
            gas_oracle,
            notifier,
            in_flight,
            config,
            native_symbols: HashMap::new(),
        }
    }

    /// Name used for native-currency transfers on `chain_id`.
    pub fn with_native_symbol(mut self, chain_id: ChainId, symbol: impl Into<String>) -> Self {
        self.native_symbols.insert(chain_id, symbol.into());
        self
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Evaluate `record` at `block_number`.
    ///
    /// `siblings` are the other records sharing its (chain, sender, nonce) slot.
    pub async fn execute(
        &self,
        record: &ScheduledTransaction,
        block_number: u64,
        siblings: &[ScheduledTransaction],
    ) -> Result<ExecutionResult, ExecuteError> {
        let Some(_guard) = self.in_flight.try_acquire(&record.id) else {
            tracing::debug!(tx_id = %record.id, "Already executing, skipping");
            return Ok(ExecutionResult::pending());
        };

        let candidate = match Candidate::new(record.clone()) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(tx_id = %record.id, error = %e, "Undecodable signed transaction");
                return Ok(ExecutionResult::failed(e.to_string(), Some(record.transaction_hash)));
            }
        };

        let client = self.chains.get(record.chain_id)?;
        let ctx = GateContext {
            candidate: &candidate,
            siblings,
            block_number,
            now: Utc::now(),
            client: client.as_ref(),
            gas_oracle: self.gas_oracle.as_ref(),
            config: &self.config,
        };

        if record.status == TransactionStatus::StaleNonce {
            return self.reconcile_stale(&ctx).await;
        }

        for gate in Gate::ORDER {
            match gate.check(&ctx).await? {
                GateOutcome::Pass => {}
                GateOutcome::AlreadyPosted => {
                    tracing::info!(
                        tx_id = %record.id,
                        tx_hash = %record.transaction_hash,
                        "Transaction already posted, confirming"
                    );
                    return Ok(self.confirm(&ctx, record.transaction_hash).await);
                }
                GateOutcome::Fail(result) => {
                    tracing::debug!(
                        tx_id = %record.id,
                        gate = gate.as_str(),
                        status = %result.status,
                        condition_met = result.condition_met,
                        "Gate not satisfied"
                    );
                    if result.gas_price_notified_at.is_some() {
                        self.notify_delayed_gas(record, &result);
                    }
                    return Ok(result);
                }
            }
        }

        if record.condition_block == 0 {
            tracing::info!(
                tx_id = %record.id,
                block = block_number,
                wait_blocks = self.config.confirmations,
                "Release conditions met"
            );
            return Ok(ExecutionResult::chosen_at(block_number));
        }

        self.broadcast(&ctx).await
    }

    /// A stale record resolves only if its own transaction filled the slot.
    async fn reconcile_stale(&self, ctx: &GateContext<'_>) -> Result<ExecutionResult, ExecuteError> {
        let record = &ctx.candidate.record;
        let on_chain = ctx.client.get_transaction_count(record.sender).await?;
        if on_chain <= record.nonce {
            return Ok(ExecutionResult::stale());
        }

        let receipt = ctx
            .client
            .get_transaction_receipt(record.transaction_hash)
            .await?;
        Ok(match receipt {
            Some(receipt) => {
                tracing::info!(
                    tx_id = %record.id,
                    tx_hash = %receipt.hash,
                    success = receipt.success,
                    "Stale transaction found on chain"
                );
                self.finalize(ctx, &receipt).not_chosen()
            }
            None => ExecutionResult::stale(),
        })
    }

    async fn broadcast(&self, ctx: &GateContext<'_>) -> Result<ExecutionResult, ExecuteError> {
        let record = &ctx.candidate.record;

        if self.config.dry_run {
            tracing::info!(tx_id = %record.id, tx_hash = %record.transaction_hash, "Dry run, not broadcasting");
            let mut result = ExecutionResult::completed(record.transaction_hash, ctx.now);
            result.asset = Some(self.asset_metadata(ctx.candidate));
            return Ok(result);
        }

        metrics::record_broadcast(record.chain_id);
        match ctx.client.send_raw_transaction(&record.signed_transaction).await {
            Ok(hash) => {
                if hash != record.transaction_hash {
                    tracing::warn!(
                        tx_id = %record.id,
                        expected = %record.transaction_hash,
                        returned = %hash,
                        "Node returned an unexpected transaction hash"
                    );
                }
                tracing::info!(tx_id = %record.id, tx_hash = %hash, "Transaction broadcast");
                Ok(self.confirm(ctx, hash).await)
            }
            Err(e) => {
                tracing::warn!(tx_id = %record.id, error = %e, "Broadcast failed");
                Ok(ExecutionResult::failed(e.to_string(), Some(record.transaction_hash)))
            }
        }
    }

    /// Wait for the required depth and turn the receipt into an outcome.
    ///
    /// A failed wait keeps the candidate chosen; the next tick finds the
    /// transaction through the already-posted gate.
    async fn confirm(&self, ctx: &GateContext<'_>, hash: TxHash) -> ExecutionResult {
        match ctx.client.wait_for_confirmations(hash, self.config.confirmations).await {
            Ok(receipt) => self.finalize(ctx, &receipt),
            Err(e) => {
                tracing::warn!(
                    tx_id = %ctx.candidate.record.id,
                    tx_hash = %hash,
                    error = %e,
                    "Confirmation wait failed, will retry next block"
                );
                ExecutionResult {
                    transaction_hash: Some(hash),
                    ..ExecutionResult::chosen()
                }
            }
        }
    }

    fn finalize(&self, ctx: &GateContext<'_>, receipt: &TxReceipt) -> ExecutionResult {
        let mut result = if receipt.success {
            ExecutionResult::completed(receipt.hash, ctx.now)
        } else {
            ExecutionResult {
                executed_at: Some(ctx.now),
                ..ExecutionResult::failed("transaction reverted", Some(receipt.hash))
            }
        };

        let gas_used = U256::from(receipt.gas_used);
        result.gas_paid = Some(gas_used * U256::from(receipt.effective_gas_price));
        if ctx.candidate.record.gas_price_aware {
            let saved_per_gas = ctx
                .candidate
                .tx
                .effective_gas_price
                .saturating_sub(receipt.effective_gas_price);
            result.gas_saved = Some(gas_used * U256::from(saved_per_gas));
        }
        result.asset = Some(self.asset_metadata(ctx.candidate));
        result
    }

    fn asset_metadata(&self, candidate: &Candidate) -> AssetMetadata {
        match &candidate.tx.transfer {
            Transfer::Token { contract, amount, .. } => AssetMetadata {
                name: contract.to_checksum(None),
                amount: *amount,
                value: None,
            },
            Transfer::Native { value, .. } => AssetMetadata {
                name: self
                    .native_symbols
                    .get(&candidate.chain_id())
                    .cloned()
                    .unwrap_or_else(|| "native".to_string()),
                amount: *value,
                value: format_units(*value, 18u8).ok(),
            },
        }
    }

    fn notify_delayed_gas(&self, record: &ScheduledTransaction, result: &ExecutionResult) {
        let mut snapshot = record.clone();
        if let Some(attempts) = result.execution_attempts {
            snapshot.execution_attempts = attempts;
        }
        snapshot.last_execution_attempt = result.last_execution_attempt;
        snapshot.gas_price_notified_at = result.gas_price_notified_at;
        notify::dispatch(&self.notifier, NotificationKind::DelayedGasPrice, snapshot);
    }
}

impl std::fmt::Debug for TransactionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionExecutor")
            .field("chains", &self.chains)
            .field("in_flight", &self.in_flight.len())
            .field("config", &self.config)
            .finish()
    }
}
