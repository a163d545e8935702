//! Folding an `ExecutionResult` back into the stored record.

use crate::executor::ExecutionResult;
use crate::notify::NotificationKind;
use crate::schedule::{RecordUpdate, ScheduledTransaction, TransactionStatus};

/// What to persist for one result, and which notification (if any) follows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merge {
    pub update: RecordUpdate,
    pub notify: Option<NotificationKind>,
}

impl Merge {
    pub fn is_noop(&self) -> bool {
        self.update.is_empty() && self.notify.is_none()
    }
}

/// Decide which fields of `record` change because of `result`.
///
/// Only fields the result actually speaks for are written: a terminal result
/// writes the outcome, a first sighting writes the condition block, a gas
/// retry writes the attempt counters.
pub fn merge(record: &ScheduledTransaction, result: &ExecutionResult) -> Merge {
    if result.is_terminal() {
        return merge_terminal(record, result);
    }

    let mut update = RecordUpdate::default();

    if result.status == TransactionStatus::StaleNonce {
        if record.status != TransactionStatus::StaleNonce {
            update.status = Some(TransactionStatus::StaleNonce);
        }
        return Merge { update, notify: None };
    }

    if record.condition_block == 0 {
        update.condition_block = result.condition_block;
    }
    update.execution_attempts = result.execution_attempts;
    update.last_execution_attempt = result.last_execution_attempt;
    update.gas_price_notified_at = result.gas_price_notified_at;

    Merge { update, notify: None }
}

fn merge_terminal(record: &ScheduledTransaction, result: &ExecutionResult) -> Merge {
    // Status already recorded; nothing new to say.
    if record.status == result.status {
        return Merge::default();
    }

    let notify = match result.status {
        TransactionStatus::Completed => Some(NotificationKind::Success),
        TransactionStatus::Error => Some(NotificationKind::Failure),
        _ => None,
    };

    let (asset_name, asset_amount, asset_value) = match &result.asset {
        Some(asset) => (Some(asset.name.clone()), Some(asset.amount), asset.value.clone()),
        None => (None, None, None),
    };

    Merge {
        update: RecordUpdate {
            status: Some(result.status),
            transaction_hash: result.transaction_hash,
            error: result.error.clone(),
            executed_at: result.executed_at,
            condition_block: None,
            execution_attempts: None,
            last_execution_attempt: None,
            gas_price_notified_at: None,
            asset_name,
            asset_amount,
            asset_value,
            gas_paid: result.gas_paid,
            gas_saved: result.gas_saved,
        },
        notify,
    }
}
