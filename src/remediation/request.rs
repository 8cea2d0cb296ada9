use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuditError, AuditResult};
use crate::findings::{Finding, split_finding_id};
use crate::identifiers::{Arn, validate_account_id};

/// One finding to remediate: which resource, in which account, for which check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationRequest {
    pub finding_id: String,
    pub check_code: String,
    pub account_id: String,
    pub region: String,
    pub partition: String,
    #[serde(serialize_with = "serialize_arn")]
    pub resource_arn: Arn,
}

fn serialize_arn<S: serde::Serializer>(arn: &Arn, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&arn.to_string())
}

impl RemediationRequest {
    /// Build a request from a finding id and the owning account.
    ///
    /// Region and partition come from the resource ARN; a regionless ARN
    /// falls back to `default_region`.
    pub fn new(finding_id: &str, account_id: &str, default_region: Option<&str>) -> AuditResult<Self> {
        let (resource, check_code) = split_finding_id(finding_id)?;
        let resource_arn = Arn::parse(resource)?;
        validate_account_id(account_id)?;

        let region = if resource_arn.region().is_empty() {
            default_region.unwrap_or_default().to_string()
        } else {
            resource_arn.region().to_string()
        };

        if region.is_empty() {
            return Err(AuditError::InvalidIdentifier(format!(
                "finding '{}' does not name a region",
                finding_id
            )));
        }

        Ok(Self {
            finding_id: finding_id.to_string(),
            check_code: check_code.to_string(),
            account_id: account_id.to_string(),
            region,
            partition: resource_arn.partition().to_string(),
            resource_arn,
        })
    }

    pub fn from_finding(finding: &Finding) -> AuditResult<Self> {
        Self::new(&finding.id, &finding.account_id, Some(&finding.region))
    }

    /// Trailing id of the target resource (`vpc-0abc`)
    pub fn resource_id(&self) -> &str {
        self.resource_arn.resource_id()
    }
}

/// Finding as it appears in a notification event
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventFinding {
    id: String,
    aws_account_id: String,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventDetail {
    #[serde(default)]
    findings: Vec<EventFinding>,
}

#[derive(Debug, Deserialize)]
struct FindingEvent {
    detail: EventDetail,
}

/// Requests carried by a finding notification event
/// (`{"detail": {"findings": [{"Id", "AwsAccountId", "Region"}]}}`).
///
/// A malformed finding fails the whole event so nothing is half-processed.
pub fn parse_finding_event(event: &Value) -> AuditResult<Vec<RemediationRequest>> {
    let event: FindingEvent = serde_json::from_value(event.clone())
        .map_err(|e| AuditError::InvalidIdentifier(format!("malformed finding event: {}", e)))?;

    event
        .detail
        .findings
        .iter()
        .map(|f| RemediationRequest::new(&f.id, &f.aws_account_id, f.region.as_deref()))
        .collect()
}
