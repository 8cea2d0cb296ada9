use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::flow_logs;
use super::pipeline::RemediationPipeline;
use super::request::RemediationRequest;
use crate::checks::vpc::FLOW_LOGGING_CHECK;
use crate::error::{AuditError, AuditResult};

/// Builds the step sequence for one request
pub type PipelineFactory =
    Arc<dyn Fn(&RemediationRequest) -> AuditResult<RemediationPipeline> + Send + Sync>;

/// Automated remediation registered for a check code
#[derive(Clone)]
pub struct Playbook {
    pub check_code: String,
    pub description: String,
    factory: PipelineFactory,
}

impl Playbook {
    pub fn new<F>(check_code: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&RemediationRequest) -> AuditResult<RemediationPipeline> + Send + Sync + 'static,
    {
        Self {
            check_code: check_code.into(),
            description: description.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn pipeline(&self, request: &RemediationRequest) -> AuditResult<RemediationPipeline> {
        (self.factory)(request)
    }
}

/// Check code to playbook mapping
pub struct PlaybookRegistry {
    playbooks: RwLock<HashMap<String, Playbook>>,
}

impl PlaybookRegistry {
    pub fn new() -> Self {
        Self {
            playbooks: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with every built-in playbook
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Playbook::new(
            FLOW_LOGGING_CHECK,
            "Create a CloudWatch Logs group and delivery role, then enable REJECT flow logs on the VPC",
            flow_logs::pipeline,
        ));
        registry
    }

    pub fn register(&self, playbook: Playbook) {
        let mut playbooks = self.playbooks.write().unwrap_or_else(PoisonError::into_inner);
        playbooks.insert(playbook.check_code.clone(), playbook);
    }

    pub fn get(&self, check_code: &str) -> AuditResult<Playbook> {
        let playbooks = self.playbooks.read().unwrap_or_else(PoisonError::into_inner);
        playbooks
            .get(check_code)
            .cloned()
            .ok_or_else(|| AuditError::UnknownPlaybook(check_code.to_string()))
    }

    pub fn has(&self, check_code: &str) -> bool {
        let playbooks = self.playbooks.read().unwrap_or_else(PoisonError::into_inner);
        playbooks.contains_key(check_code)
    }

    /// Registered playbooks sorted by check code
    pub fn list(&self) -> Vec<Playbook> {
        let playbooks = self.playbooks.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Playbook> = playbooks.values().cloned().collect();
        list.sort_by(|a, b| a.check_code.cmp(&b.check_code));
        list
    }
}

impl Default for PlaybookRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
