//! VPC flow logging check. Failing findings are remediated by the
//! flow-log playbook.

use std::collections::HashMap;

use serde_json::Value;

use super::check::{CheckEnv, CheckUnit, RuleMetadata, Verdict};
use super::with_record_evidence;
use crate::error::AuditResult;
use crate::findings::Severity;
use crate::identifiers::Arn;

pub const SERVICE: &str = "vpc";

/// Listing key for DescribeVpcs output
pub const VPCS_KEY: &str = "ec2:vpcs";

/// Listing key for DescribeFlowLogs output
pub const FLOW_LOGS_KEY: &str = "ec2:flow_logs";

pub const FLOW_LOGGING_CHECK: &str = "vpc-flow-logging-check";

const VPC_FIELDS: &[(&str, &str)] = &[
    ("VpcId", "/VpcId"),
    ("CidrBlock", "/CidrBlock"),
    ("IsDefault", "/IsDefault"),
    ("State", "/State"),
];

pub fn checks() -> Vec<CheckUnit> {
    vec![CheckUnit::new(SERVICE, flow_logging_metadata(), vpc_flow_logging)]
}

fn flow_logging_metadata() -> RuleMetadata {
    RuleMetadata::new(
        FLOW_LOGGING_CHECK,
        "EC2.VPC.1",
        "VPCs should have flow logging enabled",
    )
    .descriptions(
        "VPC {{VpcId}} ({{CidrBlock}}) does not have flow logging enabled. \
         Without flow logs, rejected and accepted traffic cannot be investigated after an incident.",
        "VPC {{VpcId}} delivers flow logs ({{FlowLogCount}} active).",
    )
    .severity(Severity::Medium)
    .remediation(
        "Enable VPC flow logs delivering rejected traffic to a CloudWatch Logs group.",
        "https://docs.aws.amazon.com/vpc/latest/userguide/flow-logs.html",
    )
    .resource_type("AwsEc2Vpc")
    .related_requirements(&[
        "NIST CSF DE.AE-3",
        "NIST SP 800-53 AU-6",
        "NIST SP 800-53 AU-12",
        "NIST SP 800-53 SI-4",
        "AICPA TSC CC7.2",
        "ISO 27001:2013 A.12.4.1",
    ])
    .evidence_fields(&["VpcId", "CidrBlock", "IsDefault", "State", "FlowLogCount"])
}

pub fn vpc_flow_logging(env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>> {
    let vpcs = env.listing(VPCS_KEY)?;
    let flow_logs = env.listing(FLOW_LOGS_KEY)?;

    let mut active: HashMap<&str, usize> = HashMap::new();
    for flow_log in flow_logs.iter() {
        let status = flow_log
            .get("FlowLogStatus")
            .and_then(Value::as_str)
            .unwrap_or("ACTIVE");
        if status != "ACTIVE" {
            continue;
        }
        if let Some(resource_id) = flow_log.get("ResourceId").and_then(Value::as_str) {
            *active.entry(resource_id).or_insert(0) += 1;
        }
    }

    let context = env.context();
    let mut verdicts = Vec::new();

    for vpc in vpcs.iter() {
        let Some(vpc_id) = vpc.get("VpcId").and_then(Value::as_str) else {
            continue;
        };
        // A malformed id names no resource a finding could point at
        let Ok(arn) = Arn::vpc(&context.partition, &context.region, &context.account_id, vpc_id) else {
            continue;
        };
        let count = active.get(vpc_id).copied().unwrap_or(0);

        let verdict = if count > 0 {
            Verdict::pass(arn.to_string())
        } else {
            Verdict::fail(arn.to_string())
        };
        verdicts.push(with_record_evidence(verdict, vpc, VPC_FIELDS).with_evidence("FlowLogCount", count));
    }

    Ok(verdicts)
}
