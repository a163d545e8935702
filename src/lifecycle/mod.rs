//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → connect chains (verify chain ids) → load store
//!         → executor + processor → one BlockWatcher per chain
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger → watchers stop polling
//!         → in-flight ticks finish → store flushed to disk
//! ```
//!
//! # Design Decisions
//! - Fail fast: an unreachable chain or a wrong chain id aborts startup
//! - Watchers drain their own ticks; the binary bounds the wait

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{connect_chains, Scheduler, StartupError};
