//! Release gates evaluated before a broadcast.
//!
//! Gates run in [`Gate::ORDER`]; the first one that does not pass decides
//! the outcome and later gates are not evaluated.

use alloy::primitives::U256;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::chain::ChainClient;
use crate::config::ExecutorConfig;
use crate::executor::result::ExecutionResult;
use crate::executor::ExecuteError;
use crate::gas::GasOracle;
use crate::schedule::{Candidate, ScheduledTransaction};

/// Everything a gate may look at for one candidate in one tick.
pub struct GateContext<'a> {
    pub candidate: &'a Candidate,
    /// Other records competing for the same (chain, sender, nonce) slot.
    pub siblings: &'a [ScheduledTransaction],
    pub block_number: u64,
    pub now: DateTime<Utc>,
    pub client: &'a dyn ChainClient,
    pub gas_oracle: &'a dyn GasOracle,
    pub config: &'a ExecutorConfig,
}

impl GateContext<'_> {
    fn record(&self) -> &ScheduledTransaction {
        &self.candidate.record
    }
}

/// Verdict of a single gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Pass,
    /// The transaction is already on chain; go straight to confirmation.
    AlreadyPosted,
    Fail(ExecutionResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    ConfirmationWait,
    AlreadyPosted,
    Nonce,
    Time,
    Amount,
    GasPrice,
}

impl Gate {
    pub const ORDER: [Gate; 6] = [
        Gate::ConfirmationWait,
        Gate::AlreadyPosted,
        Gate::Nonce,
        Gate::Time,
        Gate::Amount,
        Gate::GasPrice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Gate::ConfirmationWait => "confirmation_wait",
            Gate::AlreadyPosted => "already_posted",
            Gate::Nonce => "nonce",
            Gate::Time => "time",
            Gate::Amount => "amount",
            Gate::GasPrice => "gas_price",
        }
    }

    pub async fn check(self, ctx: &GateContext<'_>) -> Result<GateOutcome, ExecuteError> {
        match self {
            Gate::ConfirmationWait => Ok(confirmation_wait(ctx)),
            Gate::AlreadyPosted => already_posted(ctx).await,
            Gate::Nonce => nonce(ctx).await,
            Gate::Time => Ok(time(ctx)),
            Gate::Amount => amount(ctx).await,
            Gate::GasPrice => gas_price(ctx).await,
        }
    }
}

/// Chosen earlier; hold until the condition block is `confirmations` deep.
pub fn confirmation_wait(ctx: &GateContext<'_>) -> GateOutcome {
    let condition_block = ctx.record().condition_block;
    if condition_block > 0
        && ctx.block_number < condition_block.saturating_add(ctx.config.confirmations)
    {
        return GateOutcome::Fail(ExecutionResult::chosen());
    }
    GateOutcome::Pass
}

pub async fn already_posted(ctx: &GateContext<'_>) -> Result<GateOutcome, ExecuteError> {
    let posted = ctx
        .client
        .get_transaction(ctx.record().transaction_hash)
        .await?
        .is_some();
    Ok(if posted {
        GateOutcome::AlreadyPosted
    } else {
        GateOutcome::Pass
    })
}

pub async fn nonce(ctx: &GateContext<'_>) -> Result<GateOutcome, ExecuteError> {
    let record = ctx.record();

    // A sibling chosen in an earlier tick owns the slot until it resolves.
    if record.condition_block == 0 {
        if let Some(owner) = claimed_by(record, ctx.siblings) {
            tracing::debug!(
                tx_id = %record.id,
                owner = %owner.id,
                nonce = record.nonce,
                "Nonce slot already claimed"
            );
            return Ok(GateOutcome::Fail(ExecutionResult::pending()));
        }
    }

    let on_chain = ctx.client.get_transaction_count(record.sender).await?;

    if on_chain > record.nonce {
        return reconcile_consumed_slot(ctx).await.map(GateOutcome::Fail);
    }
    if on_chain < record.nonce {
        return Ok(GateOutcome::Fail(ExecutionResult::pending()));
    }
    Ok(GateOutcome::Pass)
}

/// The sibling already chosen for `record`'s slot, if any.
pub fn claimed_by<'a>(
    record: &ScheduledTransaction,
    siblings: &'a [ScheduledTransaction],
) -> Option<&'a ScheduledTransaction> {
    siblings
        .iter()
        .find(|s| s.id != record.id && s.status.is_pending() && s.condition_block > 0)
}

/// The slot is used up; work out whether it was used by this transaction.
async fn reconcile_consumed_slot(ctx: &GateContext<'_>) -> Result<ExecutionResult, ExecuteError> {
    let record = ctx.record();

    if record.status.is_terminal() {
        return Ok(ExecutionResult {
            status: record.status,
            ..ExecutionResult::pending()
        });
    }

    let receipt = ctx
        .client
        .get_transaction_receipt(record.transaction_hash)
        .await?;

    Ok(match receipt {
        Some(receipt) if receipt.success => {
            ExecutionResult::completed(receipt.hash, ctx.now).not_chosen()
        }
        Some(receipt) => {
            ExecutionResult::failed("transaction reverted", Some(receipt.hash)).not_chosen()
        }
        None => {
            tracing::debug!(
                tx_id = %record.id,
                nonce = record.nonce,
                "Nonce consumed by another transaction"
            );
            ExecutionResult::stale()
        }
    })
}

pub fn time_condition_met(record: &ScheduledTransaction, now: DateTime<Utc>) -> bool {
    record.time_condition.map_or(true, |at| now > at)
}

pub fn time(ctx: &GateContext<'_>) -> GateOutcome {
    if time_condition_met(ctx.record(), ctx.now) {
        GateOutcome::Pass
    } else {
        GateOutcome::Fail(ExecutionResult::pending())
    }
}

pub async fn amount(ctx: &GateContext<'_>) -> Result<GateOutcome, ExecuteError> {
    let record = ctx.record();
    let Some(required) = record.condition_amount else {
        return Ok(GateOutcome::Pass);
    };

    let balance: U256 = match record.condition_token() {
        Some(token) => ctx.client.get_token_balance(token, record.sender).await?,
        None => ctx.client.get_balance(record.sender).await?,
    };

    Ok(if balance >= required {
        GateOutcome::Pass
    } else {
        GateOutcome::Fail(ExecutionResult::pending())
    })
}

/// Whether another delayed-gas notification may be sent at `now`.
pub fn notification_due(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval_secs: u64,
) -> bool {
    let interval = ChronoDuration::seconds(i64::try_from(interval_secs).unwrap_or(i64::MAX));
    last.map_or(true, |at| now.signed_duration_since(at) >= interval)
}

pub async fn gas_price(ctx: &GateContext<'_>) -> Result<GateOutcome, ExecuteError> {
    let record = ctx.record();
    if !record.gas_price_aware {
        return Ok(GateOutcome::Pass);
    }

    let safe_low = ctx.gas_oracle.safe_low_gas_price(record.chain_id).await?;
    if safe_low <= ctx.candidate.tx.effective_gas_price {
        return Ok(GateOutcome::Pass);
    }

    tracing::debug!(
        tx_id = %record.id,
        safe_low,
        offered = ctx.candidate.tx.effective_gas_price,
        "Network gas price above transaction gas price"
    );

    let notify = notification_due(
        record.gas_price_notified_at,
        ctx.now,
        ctx.config.gas_notification_interval_secs,
    );

    Ok(GateOutcome::Fail(ExecutionResult {
        execution_attempts: Some(record.execution_attempts.saturating_add(1)),
        last_execution_attempt: Some(ctx.now),
        gas_price_notified_at: notify.then_some(ctx.now),
        ..ExecutionResult::pending()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainId;
    use alloy::primitives::{Address, Bytes};

    fn record() -> ScheduledTransaction {
        ScheduledTransaction::new(ChainId(1), Address::ZERO, 0, Bytes::new())
    }

    #[test]
    fn test_time_condition() {
        let now = Utc::now();
        let mut r = record();
        assert!(time_condition_met(&r, now));

        r.time_condition = Some(now - ChronoDuration::seconds(1));
        assert!(time_condition_met(&r, now));

        // Strictly after.
        r.time_condition = Some(now);
        assert!(!time_condition_met(&r, now));

        r.time_condition = Some(now + ChronoDuration::hours(1));
        assert!(!time_condition_met(&r, now));
    }

    #[test]
    fn test_notification_throttle() {
        let now = Utc::now();
        assert!(notification_due(None, now, 900));
        assert!(!notification_due(Some(now - ChronoDuration::minutes(14)), now, 900));
        assert!(notification_due(Some(now - ChronoDuration::minutes(15)), now, 900));
    }

    #[test]
    fn test_claimed_by_chosen_sibling_only() {
        let r = record();
        let mut other = record();
        other.id = "other".to_string();
        assert!(claimed_by(&r, std::slice::from_ref(&other)).is_none());

        other.condition_block = 42;
        assert_eq!(claimed_by(&r, std::slice::from_ref(&other)).map(|s| s.id.as_str()), Some("other"));

        other.status = crate::schedule::TransactionStatus::StaleNonce;
        assert!(claimed_by(&r, std::slice::from_ref(&other)).is_none());
    }

    #[test]
    fn test_gate_order() {
        assert_eq!(Gate::ORDER[0], Gate::ConfirmationWait);
        assert_eq!(Gate::ORDER[2], Gate::Nonce);
        assert_eq!(Gate::ORDER[5], Gate::GasPrice);
    }
}
