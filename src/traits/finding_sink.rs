use crate::error::ProviderError;
use crate::findings::{Finding, FindingUpdate};

/// Downstream finding-management system.
///
/// Upserts are keyed by finding id. Updates must tolerate at-least-once
/// delivery: archiving the same finding twice is harmless.
pub trait FindingSink: Send + Sync {
    /// Insert or overwrite findings by id
    fn upsert_findings(&self, findings: &[Finding]) -> Result<(), ProviderError>;

    /// Apply a note plus workflow/record state change to one finding
    fn update_finding(&self, update: &FindingUpdate) -> Result<(), ProviderError>;

    /// Previously stored findings for the given ids, used to carry
    /// `firstObservedAt` forward. Sinks without read access return nothing.
    fn get_findings(&self, _ids: &[String]) -> Result<Vec<Finding>, ProviderError> {
        Ok(Vec::new())
    }
}
