use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{AuditSettings, ExecutionContext, RetryPolicy};
use crate::error::{AuditError, AuditResult};
use crate::identifiers::{validate_account_id, validate_partition, validate_region, validate_service_tag};
use crate::remediation::RemediationSettings;
use crate::traits::FileSystem;

/// Role assumed in member accounts unless configured otherwise
pub const DEFAULT_ROLE_NAME: &str = "XA-Compliance-Response";

fn default_partition() -> String {
    "aws".to_string()
}

fn default_max_concurrent_checks() -> usize {
    8
}

fn default_role_name() -> String {
    DEFAULT_ROLE_NAME.to_string()
}

fn default_updated_by() -> String {
    whoami::username()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent_accounts() -> usize {
    4
}

/// Remediation section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Pre-provisioned cross-account role
    #[serde(default = "default_role_name")]
    pub role_name: String,

    /// Name recorded on archived findings
    #[serde(default = "default_updated_by")]
    pub updated_by: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_concurrent_accounts")]
    pub max_concurrent_accounts: usize,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            role_name: default_role_name(),
            updated_by: default_updated_by(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_accounts: default_max_concurrent_accounts(),
        }
    }
}

/// Audit run configuration
///
/// ```yaml
/// partition: aws
/// accounts: ["111111111111"]
/// regions: ["us-east-1"]
/// services: []            # empty = every registered service
/// max_concurrent_checks: 8
/// retry:
///   max_attempts: 4
///   initial_delay_ms: 200
///   max_delay_ms: 5000
/// remediation:
///   role_name: XA-Compliance-Response
///   timeout_secs: 300
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_partition")]
    pub partition: String,

    pub accounts: Vec<String>,

    pub regions: Vec<String>,

    #[serde(default)]
    pub services: Vec<String>,

    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub remediation: RemediationConfig,
}

impl AuditConfig {
    /// Load and validate a configuration file
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let content = fs.read_to_string(path)?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse configuration: {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration: {:?}", path))?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Configuration is not valid YAML")
    }

    pub fn validate(&self) -> AuditResult<()> {
        validate_partition(&self.partition)?;

        if self.accounts.is_empty() {
            return Err(AuditError::Config("at least one account is required".to_string()));
        }
        if self.regions.is_empty() {
            return Err(AuditError::Config("at least one region is required".to_string()));
        }

        for account in &self.accounts {
            validate_account_id(account)?;
        }
        for region in &self.regions {
            validate_region(region)?;
        }
        for service in &self.services {
            validate_service_tag(service)?;
        }

        if self.max_concurrent_checks == 0 {
            return Err(AuditError::Config(
                "max_concurrent_checks must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AuditError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.remediation.role_name.trim().is_empty() {
            return Err(AuditError::Config(
                "remediation.role_name cannot be empty".to_string(),
            ));
        }
        if self.remediation.max_concurrent_accounts == 0 {
            return Err(AuditError::Config(
                "remediation.max_concurrent_accounts must be at least 1".to_string(),
            ));
        }
        if self.remediation.timeout_secs == 0 {
            return Err(AuditError::Config(
                "remediation.timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// One execution context per (account, region), accounts first
    pub fn scopes(&self, invoker_identity: &str) -> AuditResult<Vec<ExecutionContext>> {
        let mut scopes = Vec::with_capacity(self.accounts.len() * self.regions.len());
        for account in &self.accounts {
            for region in &self.regions {
                scopes.push(ExecutionContext::new(
                    account.as_str(),
                    region.as_str(),
                    self.partition.as_str(),
                    invoker_identity,
                )?);
            }
        }
        Ok(scopes)
    }

    pub fn audit_settings(&self) -> AuditSettings {
        AuditSettings {
            max_concurrent_checks: self.max_concurrent_checks,
            retry: self.retry.clone(),
        }
    }

    pub fn remediation_settings(&self) -> RemediationSettings {
        RemediationSettings {
            updated_by: self.remediation.updated_by.clone(),
            timeout: Duration::from_secs(self.remediation.timeout_secs),
            max_concurrent_accounts: self.remediation.max_concurrent_accounts,
        }
    }
}
