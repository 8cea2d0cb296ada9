//! Audit execution: per-scope context, listing cache, retry and the engine
//! that runs registered checks.

pub mod audit;
pub mod cache;
pub mod context;
pub mod retry;

pub use audit::{AuditEngine, AuditSettings, CheckOutcome, RunReport, RunSummary};
pub use cache::{ExecutionCache, Listing};
pub use context::ExecutionContext;
pub use retry::{RetryFailure, RetryPolicy, retry_with_backoff};
