use std::sync::Arc;

use chrono::Utc;

use crate::error::{AuditError, AuditResult};
use crate::identifiers::validate_account_id;
use crate::identity::{ExecutionIdentity, ScopedCredentials};
use crate::traits::IdentityProvider;

/// Resolves which identity a remediation runs as.
///
/// The role name is fixed: a pre-provisioned trust relationship named
/// `role_name` must exist in every member account.
pub struct CredentialFederator {
    identity: Arc<dyn IdentityProvider>,
    role_name: String,
}

impl CredentialFederator {
    pub fn new(identity: Arc<dyn IdentityProvider>, role_name: impl Into<String>) -> Self {
        Self {
            identity,
            role_name: role_name.into(),
        }
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    /// Account id of the ambient identity
    pub fn caller_account_id(&self) -> AuditResult<String> {
        Ok(self.identity.get_caller_identity()?.account_id)
    }

    /// Local identity when the target is the caller's own account, otherwise
    /// freshly assumed credentials for the target account.
    ///
    /// Assume-role failures are not retried: a missing trust relationship is
    /// fatal for that account.
    pub fn resolve(
        &self,
        target_account_id: &str,
        caller_account_id: &str,
    ) -> AuditResult<ExecutionIdentity> {
        validate_account_id(target_account_id)?;

        if target_account_id == caller_account_id {
            return Ok(ExecutionIdentity::Local);
        }

        let credentials = self
            .identity
            .assume_role(target_account_id, &self.role_name)
            .map_err(|err| self.trust_error(target_account_id, err.to_string()))?;

        self.check_credentials(target_account_id, &credentials)?;

        Ok(ExecutionIdentity::Assumed(credentials))
    }

    fn check_credentials(
        &self,
        target_account_id: &str,
        credentials: &ScopedCredentials,
    ) -> AuditResult<()> {
        if credentials.session_token().is_empty() {
            return Err(self.trust_error(
                target_account_id,
                "role assumption returned no session token".to_string(),
            ));
        }

        if credentials.account_id() != target_account_id {
            return Err(self.trust_error(
                target_account_id,
                format!(
                    "role assumption returned credentials for account {}",
                    credentials.account_id()
                ),
            ));
        }

        credentials.ensure_valid_at(Utc::now())
    }

    fn trust_error(&self, account_id: &str, message: String) -> AuditError {
        AuditError::TrustRelationshipMissing {
            account_id: account_id.to_string(),
            role_name: self.role_name.clone(),
            message,
        }
    }
}
