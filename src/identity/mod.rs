//! Execution identity resolution for cross-account remediation.

pub mod credentials;
pub mod federator;

pub use credentials::{ExecutionIdentity, ScopedCredentials};
pub use federator::CredentialFederator;
