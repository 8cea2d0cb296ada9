use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::identity::ExecutionIdentity;

/// Log destination (CloudWatch log group)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroup {
    pub name: String,
    pub arn: String,
}

/// IAM role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamRole {
    pub name: String,
    pub arn: String,
}

/// Parameters for enabling flow logging on network resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowLogRequest {
    pub resource_ids: Vec<String>,
    pub resource_type: String,
    pub traffic_type: String,
    pub log_destination_type: String,
    pub log_group_name: String,
    pub deliver_logs_permission_arn: String,
    pub max_aggregation_interval: u32,
}

/// Create/attach primitives used by remediation steps.
///
/// Every call is independently retryable and returns identifiers that later
/// steps consume. `find_*` lookups let steps reuse artifacts left by an
/// earlier run instead of creating duplicates.
pub trait ProvisioningApi: Send + Sync {
    fn find_log_group(&self, name: &str) -> Result<Option<LogGroup>, ProviderError>;

    fn create_log_group(&self, name: &str) -> Result<(), ProviderError>;

    /// ARN of the managed policy with this name, if any
    fn find_policy(&self, name: &str) -> Result<Option<String>, ProviderError>;

    /// Create a managed policy and return its ARN
    fn create_policy(
        &self,
        name: &str,
        document: &str,
        description: &str,
    ) -> Result<String, ProviderError>;

    fn find_role(&self, name: &str) -> Result<Option<IamRole>, ProviderError>;

    fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<IamRole, ProviderError>;

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ProviderError>;

    /// Ids of flow logs already delivering for the resource
    fn list_flow_logs(&self, resource_id: &str) -> Result<Vec<String>, ProviderError>;

    /// Enable flow logging, returning the created flow log ids
    fn create_flow_logs(&self, request: &FlowLogRequest) -> Result<Vec<String>, ProviderError>;
}

/// Builds provisioning clients bound to an execution identity and region
pub trait ProvisioningFactory: Send + Sync {
    fn connect(
        &self,
        identity: &ExecutionIdentity,
        region: &str,
    ) -> Result<Arc<dyn ProvisioningApi>, ProviderError>;
}

#[cfg(test)]
pub use mock::{MockProvisioning, MockProvisioningFactory};
