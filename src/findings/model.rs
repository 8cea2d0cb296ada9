use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// Schema version stamped on every finding
pub const SCHEMA_VERSION: &str = "2018-10-08";

/// Finding type used for configuration checks
pub const BEST_PRACTICES_TYPE: &str =
    "Software and Configuration Checks/AWS Security Best Practices";

/// Marker rendered for evidence a check did not supply
pub const UNKNOWN_VALUE: &str = "unknown";

/// Finding severity label
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    #[default]
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Informational => "INFORMATIONAL",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    New,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    Active,
    Archived,
}

/// Canonical compliance finding.
///
/// Field names and enumerations are the wire contract with downstream
/// consumers; `id` is `{resource ARN}/{check code}` so re-evaluating the same
/// resource overwrites the earlier record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub schema_version: String,
    pub id: String,
    pub product_arn: String,
    pub generator_id: String,
    pub account_id: String,
    pub region: String,
    pub partition: String,
    pub types: Vec<String>,
    pub severity: Severity,
    pub confidence: u8,
    pub title: String,
    pub description: String,
    pub remediation_text: String,
    pub remediation_url: String,
    pub resource_type: String,
    pub resource_id: String,
    pub resource_details: BTreeMap<String, String>,
    pub compliance_status: ComplianceStatus,
    pub related_requirements: Vec<String>,
    pub workflow_status: WorkflowStatus,
    pub record_state: RecordState,
    pub first_observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Finding {
    /// Check code embedded in the finding id
    pub fn check_code(&self) -> AuditResult<&str> {
        split_finding_id(&self.id).map(|(_, code)| code)
    }

    pub fn is_failed(&self) -> bool {
        self.compliance_status == ComplianceStatus::Failed
    }
}

/// Targeted update applied to an existing finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingUpdate {
    pub finding_id: String,
    pub note: String,
    pub updated_by: String,
    pub workflow_status: WorkflowStatus,
    pub record_state: RecordState,
}

impl FindingUpdate {
    /// Update that archives a finding after successful remediation
    pub fn archive(
        finding_id: impl Into<String>,
        note: impl Into<String>,
        updated_by: impl Into<String>,
    ) -> Self {
        Self {
            finding_id: finding_id.into(),
            note: note.into(),
            updated_by: updated_by.into(),
            workflow_status: WorkflowStatus::Resolved,
            record_state: RecordState::Archived,
        }
    }
}

/// Deterministic finding id for a resource and check code
pub fn finding_id(resource_arn: &str, check_code: &str) -> String {
    format!("{}/{}", resource_arn, check_code)
}

/// Split a finding id into (resource ARN, check code)
pub fn split_finding_id(id: &str) -> AuditResult<(&str, &str)> {
    match id.rsplit_once('/') {
        Some((resource, code)) if !resource.is_empty() && !code.is_empty() => {
            Ok((resource, code))
        }
        _ => Err(AuditError::InvalidIdentifier(format!(
            "finding id '{}' does not end with a check code",
            id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_id_roundtrip() {
        let arn = "arn:aws:ec2:us-east-1:111111111111:vpc/vpc-0abc";
        let id = finding_id(arn, "vpc-flow-logging-check");

        assert_eq!(id, "arn:aws:ec2:us-east-1:111111111111:vpc/vpc-0abc/vpc-flow-logging-check");

        let (resource, code) = split_finding_id(&id).unwrap();
        assert_eq!(resource, arn);
        assert_eq!(code, "vpc-flow-logging-check");
    }

    #[test]
    fn test_split_finding_id_rejects_malformed() {
        assert!(split_finding_id("no-separator").is_err());
        assert!(split_finding_id("arn:aws:ec2:::vpc/").is_err());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&Severity::Informational).unwrap(), "\"INFORMATIONAL\"");
        assert_eq!(serde_json::to_string(&ComplianceStatus::Failed).unwrap(), "\"FAILED\"");
        assert_eq!(serde_json::to_string(&WorkflowStatus::Resolved).unwrap(), "\"RESOLVED\"");
        assert_eq!(serde_json::to_string(&RecordState::Archived).unwrap(), "\"ARCHIVED\"");
        assert_eq!(Severity::default(), Severity::High);
    }

    #[test]
    fn test_archive_update() {
        let update = FindingUpdate::archive("id-1", "fixed", "cco");
        assert_eq!(update.workflow_status, WorkflowStatus::Resolved);
        assert_eq!(update.record_state, RecordState::Archived);
    }
}
