//! Outcome notifications.
//!
//! Delivery channels (email, chat, webhooks) live outside the scheduler.
//! The scheduler only calls a [`NotificationSink`], always from a spawned
//! task so a slow or failing sink never holds up a tick.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::schedule::ScheduledTransaction;

#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Kinds of user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failure,
    DelayedGasPrice,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::DelayedGasPrice => "delayed_gas_price",
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_success(&self, record: &ScheduledTransaction) -> Result<(), NotifyError>;

    async fn notify_failure(&self, record: &ScheduledTransaction) -> Result<(), NotifyError>;

    async fn notify_delayed_gas_price(&self, record: &ScheduledTransaction)
        -> Result<(), NotifyError>;
}

/// Send a notification in the background; errors are logged, never returned.
pub fn dispatch(sink: &Arc<dyn NotificationSink>, kind: NotificationKind, record: ScheduledTransaction) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        let result = match kind {
            NotificationKind::Success => sink.notify_success(&record).await,
            NotificationKind::Failure => sink.notify_failure(&record).await,
            NotificationKind::DelayedGasPrice => sink.notify_delayed_gas_price(&record).await,
        };
        if let Err(e) = result {
            tracing::warn!(tx_id = %record.id, kind = kind.as_str(), error = %e, "Notification not delivered");
        }
    });
}

/// Sink that records every notification as a structured log event.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_success(&self, record: &ScheduledTransaction) -> Result<(), NotifyError> {
        tracing::info!(
            tx_id = %record.id,
            chain_id = %record.chain_id,
            tx_hash = %record.transaction_hash,
            asset = record.asset_name.as_deref().unwrap_or("unknown"),
            "Scheduled transaction completed"
        );
        Ok(())
    }

    async fn notify_failure(&self, record: &ScheduledTransaction) -> Result<(), NotifyError> {
        tracing::warn!(
            tx_id = %record.id,
            chain_id = %record.chain_id,
            tx_hash = %record.transaction_hash,
            error = record.error.as_deref().unwrap_or(""),
            "Scheduled transaction failed"
        );
        Ok(())
    }

    async fn notify_delayed_gas_price(
        &self,
        record: &ScheduledTransaction,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            tx_id = %record.id,
            chain_id = %record.chain_id,
            attempts = record.execution_attempts,
            "Scheduled transaction delayed by network gas price"
        );
        Ok(())
    }
}
