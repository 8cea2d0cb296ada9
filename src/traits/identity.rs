use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::identity::ScopedCredentials;

/// Identity the process is currently running as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub account_id: String,
    pub arn: String,
}

/// Security token service operations used by the credential federator
pub trait IdentityProvider: Send + Sync {
    /// Identity of the local (ambient) credentials
    fn get_caller_identity(&self) -> Result<CallerIdentity, ProviderError>;

    /// Exchange the ambient identity for credentials of `role_name` in
    /// `target_account_id`
    fn assume_role(
        &self,
        target_account_id: &str,
        role_name: &str,
    ) -> Result<ScopedCredentials, ProviderError>;
}

#[cfg(test)]
pub use mock::MockIdentityProvider;
