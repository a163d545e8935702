//! Metrics collection and exposition.
//!
//! # Metrics
//! - `scheduler_ticks_total{chain}` (counter): processing ticks started
//! - `scheduler_tick_errors_total{chain}` (counter): ticks aborted by an error
//! - `scheduler_broadcasts_total{chain}` (counter): raw transactions sent
//! - `scheduler_outcomes_total{chain,status}` (counter): persisted status changes
//! - `scheduler_rpc_retries_total{op}` (counter): transient RPC retries
//! - `scheduler_inflight` (gauge): executions in progress
//! - `scheduler_pending_records{chain}` (gauge): pending records seen last tick

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::chain::ChainId;
use crate::schedule::TransactionStatus;

/// Start the Prometheus exporter on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_tick(chain_id: ChainId) {
    metrics::counter!("scheduler_ticks_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_tick_error(chain_id: ChainId) {
    metrics::counter!("scheduler_tick_errors_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_broadcast(chain_id: ChainId) {
    metrics::counter!("scheduler_broadcasts_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_outcome(chain_id: ChainId, status: TransactionStatus) {
    metrics::counter!(
        "scheduler_outcomes_total",
        "chain" => chain_id.to_string(),
        "status" => status.as_str()
    )
    .increment(1);
}

pub fn record_rpc_retry(op: &'static str) {
    metrics::counter!("scheduler_rpc_retries_total", "op" => op).increment(1);
}

pub fn set_inflight(count: usize) {
    metrics::gauge!("scheduler_inflight").set(count as f64);
}

pub fn set_pending(chain_id: ChainId, count: usize) {
    metrics::gauge!("scheduler_pending_records", "chain" => chain_id.to_string()).set(count as f64);
}
