use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde_json::Value;

use super::model::{
    BEST_PRACTICES_TYPE, ComplianceStatus, Finding, RecordState, SCHEMA_VERSION, Severity,
    UNKNOWN_VALUE, WorkflowStatus, finding_id,
};
use crate::checks::{RuleMetadata, Verdict};
use crate::engine::ExecutionContext;
use crate::identifiers::Arn;

/// Turns check verdicts into canonical findings.
///
/// Descriptions are Handlebars templates rendered against the verdict's
/// evidence; a template that fails to render is emitted verbatim so a bad
/// description never loses a finding.
pub struct FindingNormalizer {
    handlebars: Handlebars<'static>,
}

impl FindingNormalizer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        // Findings are plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    pub fn normalize(
        &self,
        verdict: &Verdict,
        metadata: &RuleMetadata,
        context: &ExecutionContext,
        prior: Option<&Finding>,
    ) -> Finding {
        self.normalize_at(Utc::now(), verdict, metadata, context, prior)
    }

    /// Normalize with an explicit clock.
    ///
    /// `prior` is the stored finding with the same id, if any; its
    /// `first_observed_at` is carried forward.
    pub fn normalize_at(
        &self,
        now: DateTime<Utc>,
        verdict: &Verdict,
        metadata: &RuleMetadata,
        context: &ExecutionContext,
        prior: Option<&Finding>,
    ) -> Finding {
        let id = finding_id(&verdict.resource_id, &metadata.code_for(verdict));
        let details = resource_details(verdict, metadata);

        let (severity, compliance_status, workflow_status, record_state, template) =
            if verdict.passed {
                (
                    Severity::Informational,
                    ComplianceStatus::Passed,
                    WorkflowStatus::Resolved,
                    RecordState::Archived,
                    &metadata.pass_description,
                )
            } else {
                (
                    metadata.severity.unwrap_or_default(),
                    ComplianceStatus::Failed,
                    WorkflowStatus::New,
                    RecordState::Active,
                    &metadata.fail_description,
                )
            };

        let first_observed_at = prior
            .filter(|p| p.id == id)
            .map(|p| p.first_observed_at)
            .unwrap_or(now);

        let product_arn = Arn::finding_product(&context.partition, &context.region, &context.account_id)
            .map(|arn| arn.to_string())
            .unwrap_or_default();

        Finding {
            schema_version: SCHEMA_VERSION.to_string(),
            id,
            product_arn,
            generator_id: verdict.resource_id.clone(),
            account_id: context.account_id.clone(),
            region: context.region.clone(),
            partition: context.partition.clone(),
            types: vec![BEST_PRACTICES_TYPE.to_string()],
            severity,
            confidence: metadata.confidence,
            title: self.render(&metadata.title_for(verdict), &details, verdict, context),
            description: self.render(template, &details, verdict, context),
            remediation_text: metadata.remediation_text.clone(),
            remediation_url: metadata.remediation_url.clone(),
            resource_type: metadata.resource_type.clone(),
            resource_id: verdict.resource_id.clone(),
            resource_details: details,
            compliance_status,
            related_requirements: metadata.related_requirements.clone(),
            workflow_status,
            record_state,
            first_observed_at,
            created_at: now,
            updated_at: now,
        }
    }

    fn render(
        &self,
        template: &str,
        details: &BTreeMap<String, String>,
        verdict: &Verdict,
        context: &ExecutionContext,
    ) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }

        let mut data: BTreeMap<String, String> = details.clone();
        data.entry("ResourceId".to_string())
            .or_insert_with(|| verdict.resource_id.clone());
        data.entry("AccountId".to_string())
            .or_insert_with(|| context.account_id.clone());
        data.entry("Region".to_string())
            .or_insert_with(|| context.region.clone());

        self.handlebars
            .render_template(template, &data)
            .unwrap_or_else(|_| template.to_string())
    }
}

impl Default for FindingNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Declared evidence fields first (missing ones as "unknown"), then any extra
/// evidence the check supplied
fn resource_details(verdict: &Verdict, metadata: &RuleMetadata) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();

    for field in &metadata.evidence_fields {
        let value = verdict
            .evidence
            .get(field)
            .map(evidence_text)
            .unwrap_or_else(|| UNKNOWN_VALUE.to_string());
        details.insert(field.clone(), value);
    }

    for (key, value) in &verdict.evidence {
        details
            .entry(key.clone())
            .or_insert_with(|| evidence_text(value));
    }

    details
}

fn evidence_text(value: &Value) -> String {
    match value {
        Value::Null => UNKNOWN_VALUE.to_string(),
        Value::String(s) if s.is_empty() => UNKNOWN_VALUE.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    const ARN: &str = "arn:aws:dax:us-east-1:111111111111:cache/orders";

    fn context() -> ExecutionContext {
        ExecutionContext::new("111111111111", "us-east-1", "aws", "auditor").unwrap()
    }

    fn metadata() -> RuleMetadata {
        RuleMetadata::new("dax-encryption-at-rest-check", "DAX.1", "Encrypt DAX")
            .descriptions(
                "Cluster {{ClusterName}} <{{NodeType}}> is not encrypted",
                "Cluster {{ClusterName}} is encrypted",
            )
            .severity(Severity::Critical)
            .resource_type("AwsDaxCluster")
            .related_requirements(&["NIST CSF PR.DS-1", "ISO 27001:2013 A.8.2.3"])
            .evidence_fields(&["ClusterName", "NodeType", "IamRoleArn"])
    }

    #[test]
    fn test_failed_verdict_mapping() {
        let verdict = Verdict::fail(ARN)
            .with_evidence("ClusterName", "orders")
            .with_evidence("NodeType", "dax.r5.large");

        let finding = FindingNormalizer::new().normalize(&verdict, &metadata(), &context(), None);

        assert_eq!(finding.id, format!("{}/dax-encryption-at-rest-check", ARN));
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.compliance_status, ComplianceStatus::Failed);
        assert_eq!(finding.workflow_status, WorkflowStatus::New);
        assert_eq!(finding.record_state, RecordState::Active);
        assert_eq!(finding.title, "[DAX.1] Encrypt DAX");
        assert_eq!(
            finding.product_arn,
            "arn:aws:securityhub:us-east-1:111111111111:product/111111111111/default"
        );
        assert_eq!(finding.related_requirements.len(), 2);
    }

    #[test]
    fn test_passed_verdict_mapping() {
        let verdict = Verdict::pass(ARN).with_evidence("ClusterName", "orders");

        let finding = FindingNormalizer::new().normalize(&verdict, &metadata(), &context(), None);

        assert_eq!(finding.severity, Severity::Informational);
        assert_eq!(finding.compliance_status, ComplianceStatus::Passed);
        assert_eq!(finding.workflow_status, WorkflowStatus::Resolved);
        assert_eq!(finding.record_state, RecordState::Archived);
        assert_eq!(finding.description, "Cluster orders is encrypted");
    }

    #[test]
    fn test_missing_evidence_renders_unknown() {
        let verdict = Verdict::fail(ARN).with_evidence("ClusterName", "orders");

        let finding = FindingNormalizer::new().normalize(&verdict, &metadata(), &context(), None);

        assert_eq!(finding.resource_details["IamRoleArn"], "unknown");
        assert_eq!(finding.resource_details["NodeType"], "unknown");
        assert_eq!(finding.description, "Cluster orders <unknown> is not encrypted");
    }

    #[test]
    fn test_default_severity_is_high() {
        let mut metadata = metadata();
        metadata.severity = None;

        let finding =
            FindingNormalizer::new().normalize(&Verdict::fail(ARN), &metadata, &context(), None);

        assert_eq!(finding.severity, Severity::High);
    }

    #[test]
    fn test_id_is_stable_across_runs() {
        let normalizer = FindingNormalizer::new();
        let first = normalizer.normalize(&Verdict::fail(ARN), &metadata(), &context(), None);
        let second = normalizer.normalize(&Verdict::pass(ARN), &metadata(), &context(), None);

        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_first_observed_is_preserved_from_prior() {
        let normalizer = FindingNormalizer::new();
        let earlier = Utc::now() - Duration::days(3);
        let prior = normalizer.normalize_at(earlier, &Verdict::fail(ARN), &metadata(), &context(), None);

        let now = Utc::now();
        let finding =
            normalizer.normalize_at(now, &Verdict::fail(ARN), &metadata(), &context(), Some(&prior));

        assert_eq!(finding.first_observed_at, earlier);
        assert_eq!(finding.created_at, now);
        assert_eq!(finding.updated_at, now);
    }

    #[test]
    fn test_prior_with_other_id_is_ignored() {
        let normalizer = FindingNormalizer::new();
        let mut prior = normalizer.normalize(&Verdict::fail(ARN), &metadata(), &context(), None);
        prior.id = "arn:aws:dax:us-east-1:111111111111:cache/other/dax-encryption-at-rest-check".to_string();
        prior.first_observed_at = Utc::now() - Duration::days(30);

        let now = Utc::now();
        let finding =
            normalizer.normalize_at(now, &Verdict::fail(ARN), &metadata(), &context(), Some(&prior));

        assert_eq!(finding.first_observed_at, now);
    }

    #[test]
    fn test_broken_template_is_kept_verbatim() {
        let metadata = metadata().descriptions("Broken {{#if}}", "ok");

        let finding =
            FindingNormalizer::new().normalize(&Verdict::fail(ARN), &metadata, &context(), None);

        assert_eq!(finding.description, "Broken {{#if}}");
    }

    #[test]
    fn test_extra_evidence_is_kept() {
        let verdict = Verdict::fail(ARN).with_evidence("TotalNodes", json!(3));

        let finding = FindingNormalizer::new().normalize(&verdict, &metadata(), &context(), None);

        assert_eq!(finding.resource_details["TotalNodes"], "3");
    }

    #[test]
    fn test_itemized_verdict_gets_own_id_and_title() {
        let metadata = RuleMetadata::new(
            "attack-surface-ec2-open-check",
            "AttackSurface.EC2",
            "EC2 Instances should not be publicly reachable on {{ServiceName}}",
        );
        let instance = "arn:aws:ec2:us-east-1:111111111111:instance/i-0abc";
        let verdict = Verdict::fail(instance)
            .with_evidence("ServiceName", "SSH")
            .itemized("ssh", 2);

        let finding = FindingNormalizer::new().normalize(&verdict, &metadata, &context(), None);

        assert_eq!(finding.id, format!("{}/attack-surface-ec2-open-ssh-check", instance));
        assert_eq!(
            finding.title,
            "[AttackSurface.EC2.2] EC2 Instances should not be publicly reachable on SSH"
        );
    }
}
