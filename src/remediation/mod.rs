//! Automated remediation: playbooks of provisioning steps run against the
//! account that owns a failing finding.

pub mod flow_logs;
pub mod orchestrator;
pub mod pipeline;
pub mod playbook;
pub mod request;
pub mod step;

pub use orchestrator::{
    BatchEntry, RemediationOrchestrator, RemediationOutcome, RemediationReport, RemediationSettings,
    ReportingStatus,
};
pub use pipeline::{PipelineRun, RemediationPipeline, RemediationState, RunProgress, StepRecord};
pub use playbook::{Playbook, PlaybookRegistry};
pub use request::{RemediationRequest, parse_finding_event};
pub use step::{RemediationStep, StepContext, StepOutcome};
