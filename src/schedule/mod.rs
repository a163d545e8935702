//! Scheduled transaction records and their storage.
//!
//! # Data Flow
//! ```text
//! schedule request (CLI / external API)
//!     → types.rs (ScheduledTransaction, status Pending, conditionBlock 0)
//!     → repository.rs (ScheduleRepository contract)
//!     → store.rs (DashMap + JSON file)
//!
//! each tick:
//!     repository → signed.rs (Candidate working copy)
//!     → executor → RecordUpdate → repository
//! ```

pub mod repository;
pub mod signed;
pub mod store;
pub mod types;

pub use repository::{RepositoryError, RepositoryResult, ScheduleFilter, ScheduleRepository};
pub use signed::{Candidate, SignedTransaction, Transfer};
pub use store::FileRepository;
pub use types::{RecordUpdate, ScheduledTransaction, TransactionStatus};
