//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (tick, broadcast and outcome counters; in-flight gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Every log line carries `chain_id` / `tx_id` fields instead of formatted text
//! - Metric helpers are free functions so call sites stay one line
//! - With no recorder installed the metric calls are no-ops (tests, CLI)

pub mod logging;
pub mod metrics;
