use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::request::RemediationRequest;
use crate::error::ProviderError;
use crate::identity::ExecutionIdentity;
use crate::traits::ProvisioningApi;

/// What a step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step changed remote state
    Applied,
    /// An artifact from an earlier run was found and reused
    Reused,
    /// Nothing to do; later steps are skipped and the finding is left alone
    AlreadyRemediated(String),
}

/// Accumulating state shared by the steps of one pipeline run.
///
/// Each step reads the outputs of earlier steps and records its own.
pub struct StepContext {
    request: RemediationRequest,
    identity: ExecutionIdentity,
    provisioning: Arc<dyn ProvisioningApi>,
    outputs: BTreeMap<String, String>,
    resources: Vec<String>,
}

impl StepContext {
    pub fn new(
        request: RemediationRequest,
        identity: ExecutionIdentity,
        provisioning: Arc<dyn ProvisioningApi>,
    ) -> Self {
        Self {
            request,
            identity,
            provisioning,
            outputs: BTreeMap::new(),
            resources: Vec::new(),
        }
    }

    pub fn request(&self) -> &RemediationRequest {
        &self.request
    }

    pub fn identity(&self) -> &ExecutionIdentity {
        &self.identity
    }

    pub fn provisioning(&self) -> &dyn ProvisioningApi {
        self.provisioning.as_ref()
    }

    pub fn set_output(&mut self, key: &str, value: impl Into<String>) {
        self.outputs.insert(key.to_string(), value.into());
    }

    /// Output recorded by an earlier step
    pub fn output(&self, key: &str) -> Result<&str, ProviderError> {
        self.outputs.get(key).map(String::as_str).ok_or_else(|| {
            ProviderError::InvalidRequest(format!("no earlier step produced '{}'", key))
        })
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    /// Record a concrete resource the run created or reused, for the
    /// finding note
    pub fn record_resource(&mut self, description: impl Into<String>) {
        self.resources.push(description.into());
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }
}

/// One provisioning action in a remediation pipeline
pub trait RemediationStep: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError>;

    /// Manual cleanup an operator may need after a later step fails.
    /// Never executed automatically.
    fn compensating_action(&self) -> Option<String> {
        None
    }
}
