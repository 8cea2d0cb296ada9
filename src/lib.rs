//! Compliance check orchestration: run registered checks across
//! account/region scopes, normalize their verdicts into findings, and
//! remediate failing findings in the owning account.

pub mod checks;
pub mod commands;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod findings;
pub mod fixture;
pub mod identifiers;
pub mod identity;
pub mod output;
pub mod remediation;
pub mod traits;

pub use error::{AuditError, AuditResult, ProviderError};
