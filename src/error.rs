use std::fmt;

use chrono::{DateTime, Utc};

/// Errors returned by external collaborators (resource, identity, sink and
/// provisioning APIs)
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Request was throttled by the remote API
    Throttled(String),

    /// Request timed out
    Timeout(String),

    /// Remote service is unavailable
    Unavailable(String),

    /// Caller is not authorized for the operation
    Unauthorized(String),

    /// Requested entity does not exist
    NotFound(String),

    /// Entity with the same name already exists
    AlreadyExists(String),

    /// Request was rejected as malformed
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether the error is worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Throttled(_) | ProviderError::Timeout(_))
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Throttled(msg) => write!(f, "Request throttled: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Request timed out: {}", msg),
            ProviderError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ProviderError::Unauthorized(msg) => write!(f, "Not authorized: {}", msg),
            ProviderError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ProviderError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Error types for audit and remediation operations
#[derive(Debug, Clone)]
pub enum AuditError {
    /// Resource listing could not be fetched for a cache key
    Fetch {
        key: String,
        attempts: u32,
        source: ProviderError,
    },

    /// Role assumption into the target account failed
    TrustRelationshipMissing {
        account_id: String,
        role_name: String,
        message: String,
    },

    /// Scoped credentials were used after they expired
    CredentialsExpired {
        account_id: String,
        expired_at: DateTime<Utc>,
    },

    /// A remediation step failed; later steps were not executed
    StepExecution {
        step: String,
        completed: Vec<String>,
        source: ProviderError,
    },

    /// Remediation did not finish before the run deadline
    RemediationTimedOut {
        finding_id: String,
        completed: Vec<String>,
    },

    /// No remediation playbook is registered for the check code
    UnknownPlaybook(String),

    /// Identifier failed validation (ARN, account id, region, name)
    InvalidIdentifier(String),

    /// Check registration was rejected
    Registration(String),

    /// A check failed while evaluating resources
    Check { code: String, message: String },

    /// Invalid configuration
    Config(String),

    /// A collaborator call failed outside of a step or fetch
    Provider(ProviderError),

    /// A worker task panicked or was cancelled
    Internal(String),
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::Fetch {
                key,
                attempts,
                source,
            } => {
                write!(
                    f,
                    "Failed to fetch '{}' after {} attempt(s): {}",
                    key, attempts, source
                )
            }
            AuditError::TrustRelationshipMissing {
                account_id,
                role_name,
                message,
            } => {
                write!(
                    f,
                    "Cannot assume role '{}' in account {}: {}",
                    role_name, account_id, message
                )
            }
            AuditError::CredentialsExpired {
                account_id,
                expired_at,
            } => {
                write!(
                    f,
                    "Credentials for account {} expired at {}",
                    account_id,
                    expired_at.to_rfc3339()
                )
            }
            AuditError::StepExecution {
                step,
                completed,
                source,
            } => {
                write!(f, "Remediation step '{}' failed: {}", step, source)?;

                if !completed.is_empty() {
                    write!(f, " (completed: {})", completed.join(", "))?;
                }

                Ok(())
            }
            AuditError::RemediationTimedOut {
                finding_id,
                completed,
            } => {
                write!(
                    f,
                    "Remediation of '{}' timed out after {} completed step(s)",
                    finding_id,
                    completed.len()
                )
            }
            AuditError::UnknownPlaybook(code) => {
                write!(f, "No remediation playbook for check '{}'", code)
            }
            AuditError::InvalidIdentifier(msg) => {
                write!(f, "Invalid identifier: {}", msg)
            }
            AuditError::Registration(msg) => {
                write!(f, "Check registration failed: {}", msg)
            }
            AuditError::Check { code, message } => {
                write!(f, "Check '{}' failed: {}", code, message)
            }
            AuditError::Config(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            AuditError::Provider(err) => {
                write!(f, "Provider error: {}", err)
            }
            AuditError::Internal(msg) => {
                write!(f, "Internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for AuditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuditError::Fetch { source, .. } => Some(source),
            AuditError::StepExecution { source, .. } => Some(source),
            AuditError::Provider(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProviderError> for AuditError {
    fn from(err: ProviderError) -> Self {
        AuditError::Provider(err)
    }
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
