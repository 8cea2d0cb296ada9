//! Playbook enabling VPC flow logs delivered to a dedicated CloudWatch Logs
//! group through a dedicated IAM role.

use serde_json::json;

use super::pipeline::RemediationPipeline;
use super::request::RemediationRequest;
use super::step::{RemediationStep, StepContext, StepOutcome};
use crate::error::{AuditResult, ProviderError};
use crate::identifiers::{MAX_POLICY_NAME_LEN, MAX_ROLE_NAME_LEN, bounded_name};
use crate::traits::FlowLogRequest;

const LOG_GROUP_ARN: &str = "log_group_arn";
const LOG_GROUP_NAME: &str = "log_group_name";
const ACCESS_POLICY: &str = "access_policy";
const POLICY_ARN: &str = "policy_arn";
const ROLE_NAME: &str = "role_name";
const ROLE_ARN: &str = "role_arn";
const FLOW_LOG_IDS: &str = "flow_log_ids";

/// Principal allowed to assume the delivery role
const FLOW_LOGS_SERVICE: &str = "vpc-flow-logs.amazonaws.com";

/// Deterministic artifact names for one VPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowLogNames {
    pub log_group: String,
    pub policy: String,
    pub role: String,
}

impl FlowLogNames {
    pub fn for_vpc(vpc_id: &str) -> AuditResult<Self> {
        Ok(Self {
            log_group: format!("VPCFlowLogs/{}", vpc_id),
            policy: bounded_name("VPCFlowLogsPolicy-", vpc_id, MAX_POLICY_NAME_LEN)?,
            role: bounded_name("VPCFlowLogsRole-", vpc_id, MAX_ROLE_NAME_LEN)?,
        })
    }
}

/// Build the flow-log pipeline for the VPC named by `request`
pub fn pipeline(request: &RemediationRequest) -> AuditResult<RemediationPipeline> {
    let vpc_id = request.resource_id().to_string();
    let names = FlowLogNames::for_vpc(&vpc_id)?;

    Ok(RemediationPipeline::new(vec![
        Box::new(CheckExistingFlowLogs {
            vpc_id: vpc_id.clone(),
        }),
        Box::new(EnsureLogGroup {
            name: names.log_group.clone(),
        }),
        Box::new(DescribeLogGroup {
            name: names.log_group.clone(),
        }),
        Box::new(BuildAccessPolicy),
        Box::new(EnsurePolicy {
            name: names.policy.clone(),
            vpc_id: vpc_id.clone(),
        }),
        Box::new(EnsureRole {
            name: names.role.clone(),
            vpc_id: vpc_id.clone(),
        }),
        Box::new(AttachPolicy),
        Box::new(EnableFlowLogs { vpc_id }),
    ]))
}

/// Stop early when the VPC already delivers flow logs
struct CheckExistingFlowLogs {
    vpc_id: String,
}

impl RemediationStep for CheckExistingFlowLogs {
    fn name(&self) -> &str {
        "check-existing-flow-logs"
    }

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError> {
        let existing = ctx.provisioning().list_flow_logs(&self.vpc_id)?;
        if existing.is_empty() {
            return Ok(StepOutcome::Applied);
        }

        Ok(StepOutcome::AlreadyRemediated(format!(
            "{} already delivers flow logs ({})",
            self.vpc_id,
            existing.join(", ")
        )))
    }
}

struct EnsureLogGroup {
    name: String,
}

impl RemediationStep for EnsureLogGroup {
    fn name(&self) -> &str {
        "ensure-log-group"
    }

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError> {
        if ctx.provisioning().find_log_group(&self.name)?.is_some() {
            ctx.record_resource(format!("log group {} (existing)", self.name));
            return Ok(StepOutcome::Reused);
        }

        ctx.provisioning().create_log_group(&self.name)?;
        ctx.record_resource(format!("log group {} (created)", self.name));
        Ok(StepOutcome::Applied)
    }

    fn compensating_action(&self) -> Option<String> {
        Some(format!("delete log group {}", self.name))
    }
}

/// Resolve the log group ARN for the policy document
struct DescribeLogGroup {
    name: String,
}

impl RemediationStep for DescribeLogGroup {
    fn name(&self) -> &str {
        "describe-log-group"
    }

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError> {
        let group = ctx
            .provisioning()
            .find_log_group(&self.name)?
            .ok_or_else(|| ProviderError::NotFound(format!("log group {}", self.name)))?;

        ctx.set_output(LOG_GROUP_NAME, group.name);
        ctx.set_output(LOG_GROUP_ARN, group.arn);
        Ok(StepOutcome::Applied)
    }
}

/// Permissions the flow-log service needs on the log group
pub fn access_policy_document(log_group_arn: &str) -> serde_json::Value {
    // Described ARNs end in ":*"; the statement covers the group and its streams
    let base = log_group_arn.trim_end_matches(":*");

    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": [
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents",
                    "logs:DescribeLogGroups",
                    "logs:DescribeLogStreams"
                ],
                "Resource": format!("{}:*", base)
            }
        ]
    })
}

pub fn trust_policy_document() -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": FLOW_LOGS_SERVICE },
                "Action": "sts:AssumeRole"
            }
        ]
    })
}

struct BuildAccessPolicy;

impl RemediationStep for BuildAccessPolicy {
    fn name(&self) -> &str {
        "build-access-policy"
    }

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError> {
        let document = access_policy_document(ctx.output(LOG_GROUP_ARN)?);
        ctx.set_output(ACCESS_POLICY, document.to_string());
        Ok(StepOutcome::Applied)
    }
}

struct EnsurePolicy {
    name: String,
    vpc_id: String,
}

impl RemediationStep for EnsurePolicy {
    fn name(&self) -> &str {
        "ensure-policy"
    }

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError> {
        if let Some(arn) = ctx.provisioning().find_policy(&self.name)? {
            ctx.set_output(POLICY_ARN, arn);
            ctx.record_resource(format!("policy {} (existing)", self.name));
            return Ok(StepOutcome::Reused);
        }

        let document = ctx.output(ACCESS_POLICY)?.to_string();
        let description = format!("Allows {} to publish flow logs to CloudWatch", self.vpc_id);
        let arn = ctx
            .provisioning()
            .create_policy(&self.name, &document, &description)?;

        ctx.set_output(POLICY_ARN, arn);
        ctx.record_resource(format!("policy {} (created)", self.name));
        Ok(StepOutcome::Applied)
    }

    fn compensating_action(&self) -> Option<String> {
        Some(format!("delete policy {}", self.name))
    }
}

struct EnsureRole {
    name: String,
    vpc_id: String,
}

impl RemediationStep for EnsureRole {
    fn name(&self) -> &str {
        "ensure-role"
    }

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError> {
        if let Some(role) = ctx.provisioning().find_role(&self.name)? {
            ctx.set_output(ROLE_NAME, role.name);
            ctx.set_output(ROLE_ARN, role.arn);
            ctx.record_resource(format!("role {} (existing)", self.name));
            return Ok(StepOutcome::Reused);
        }

        let description = format!("Allows {} to publish logs to CloudWatch", self.vpc_id);
        let role = ctx.provisioning().create_role(
            &self.name,
            &trust_policy_document().to_string(),
            &description,
        )?;

        ctx.set_output(ROLE_NAME, role.name);
        ctx.set_output(ROLE_ARN, role.arn);
        ctx.record_resource(format!("role {} (created)", self.name));
        Ok(StepOutcome::Applied)
    }

    fn compensating_action(&self) -> Option<String> {
        Some(format!("delete role {}", self.name))
    }
}

struct AttachPolicy;

impl RemediationStep for AttachPolicy {
    fn name(&self) -> &str {
        "attach-policy"
    }

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError> {
        let role_name = ctx.output(ROLE_NAME)?.to_string();
        let policy_arn = ctx.output(POLICY_ARN)?.to_string();

        // Attaching an already attached policy is a no-op remotely
        ctx.provisioning().attach_role_policy(&role_name, &policy_arn)?;
        Ok(StepOutcome::Applied)
    }

    fn compensating_action(&self) -> Option<String> {
        Some("detach the flow-log policy from its role".to_string())
    }
}

struct EnableFlowLogs {
    vpc_id: String,
}

impl RemediationStep for EnableFlowLogs {
    fn name(&self) -> &str {
        "enable-flow-logs"
    }

    fn apply(&self, ctx: &mut StepContext) -> Result<StepOutcome, ProviderError> {
        let request = FlowLogRequest {
            resource_ids: vec![self.vpc_id.clone()],
            resource_type: "VPC".to_string(),
            traffic_type: "REJECT".to_string(),
            log_destination_type: "cloud-watch-logs".to_string(),
            log_group_name: ctx.output(LOG_GROUP_NAME)?.to_string(),
            deliver_logs_permission_arn: ctx.output(ROLE_ARN)?.to_string(),
            max_aggregation_interval: 60,
        };

        let ids = ctx.provisioning().create_flow_logs(&request)?;
        if ids.is_empty() {
            return Err(ProviderError::InvalidRequest(format!(
                "no flow log was created for {}",
                self.vpc_id
            )));
        }

        ctx.set_output(FLOW_LOG_IDS, ids.join(","));
        ctx.record_resource(format!(
            "flow logs {} on {} delivering to {}",
            ids.join(", "),
            self.vpc_id,
            request.log_group_name
        ));
        Ok(StepOutcome::Applied)
    }
}
