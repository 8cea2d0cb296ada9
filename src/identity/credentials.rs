use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{AuditError, AuditResult};

/// Short-lived credentials for one target account.
///
/// Owned by the remediation invocation that requested them and never shared
/// or cached across findings.
#[derive(Clone, PartialEq, Eq)]
pub struct ScopedCredentials {
    account_id: String,
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: DateTime<Utc>,
}

impl ScopedCredentials {
    pub fn new(
        account_id: &str,
        access_key_id: &str,
        secret_access_key: &str,
        session_token: &str,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: session_token.to_string(),
            expiration,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Fail if the credentials are no longer usable at `now`.
    ///
    /// Pipelines never refresh mid-run; hitting this is a programming error
    /// (the run timeout must stay well inside the token lifetime).
    pub fn ensure_valid_at(&self, now: DateTime<Utc>) -> AuditResult<()> {
        if self.is_expired_at(now) {
            return Err(AuditError::CredentialsExpired {
                account_id: self.account_id.clone(),
                expired_at: self.expiration,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ScopedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCredentials")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Identity a remediation pipeline executes under
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionIdentity {
    /// Ambient credentials of the running process (same account)
    Local,
    /// Role assumed in another account
    Assumed(ScopedCredentials),
}

impl ExecutionIdentity {
    pub fn is_local(&self) -> bool {
        matches!(self, ExecutionIdentity::Local)
    }

    pub fn credentials(&self) -> Option<&ScopedCredentials> {
        match self {
            ExecutionIdentity::Local => None,
            ExecutionIdentity::Assumed(credentials) => Some(credentials),
        }
    }

    /// Local identity never expires; assumed credentials are checked
    pub fn ensure_valid_at(&self, now: DateTime<Utc>) -> AuditResult<()> {
        match self {
            ExecutionIdentity::Local => Ok(()),
            ExecutionIdentity::Assumed(credentials) => credentials.ensure_valid_at(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credentials(expiration: DateTime<Utc>) -> ScopedCredentials {
        ScopedCredentials::new("111111111111", "ASIAKEY", "secret", "token", expiration)
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = credentials(Utc::now() + Duration::hours(1));
        let text = format!("{:?}", creds);

        assert!(text.contains("ASIAKEY"));
        assert!(!text.contains("\"secret\""));
        assert!(!text.contains("\"token\""));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn test_expiry_is_checked() {
        let now = Utc::now();
        let creds = credentials(now + Duration::minutes(5));

        assert!(creds.ensure_valid_at(now).is_ok());
        assert!(creds.is_expired_at(now + Duration::minutes(5)));

        let err = creds.ensure_valid_at(now + Duration::minutes(6)).unwrap_err();
        assert!(matches!(err, AuditError::CredentialsExpired { .. }));
    }

    #[test]
    fn test_local_identity_never_expires() {
        assert!(ExecutionIdentity::Local.ensure_valid_at(Utc::now()).is_ok());
        assert!(ExecutionIdentity::Local.credentials().is_none());
    }
}
