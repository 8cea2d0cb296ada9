//! Attack surface checks for EC2 instances and internet-facing application
//! load balancers.
//!
//! Reachability comes from a TCP scan run outside the engine. The provider
//! attaches its results to each record as `PortScan`:
//!
//! ```yaml
//! PortScan:
//!   - { Port: 22, State: open, Reason: syn-ack, Service: ssh }
//!   - { Port: 3389, State: filtered, Reason: no-response, Service: ms-wbt-server }
//! ```
//!
//! Every scanned port is reported as its own finding, numbered in scan order.
//! Records without scan results produce nothing.

use serde_json::Value;

use super::check::{CheckEnv, CheckUnit, RuleMetadata, Verdict};
use super::with_record_evidence;
use crate::error::AuditResult;
use crate::findings::Severity;
use crate::identifiers::Arn;

pub const EC2_SERVICE: &str = "ec2";
pub const ELBV2_SERVICE: &str = "elbv2";

/// Listing key for running instances (DescribeInstances output)
pub const INSTANCES_KEY: &str = "ec2:instances";

/// Listing key for DescribeLoadBalancers output
pub const LOAD_BALANCERS_KEY: &str = "elbv2:load_balancers";

pub const EC2_OPEN_PORT_CHECK: &str = "attack-surface-ec2-open-check";
pub const ELBV2_OPEN_PORT_CHECK: &str = "attack-surface-elbv2-open-check";

const SCAN_FIELD: &str = "PortScan";

const REQUIREMENTS: &[&str] = &[
    "NIST CSF PR.AC-3",
    "NIST SP 800-53 AC-1",
    "NIST SP 800-53 AC-17",
    "NIST SP 800-53 AC-19",
    "NIST SP 800-53 AC-20",
    "NIST SP 800-53 SC-15",
    "AICPA TSC CC6.6",
    "ISO 27001:2013 A.6.2.1",
    "ISO 27001:2013 A.6.2.2",
    "ISO 27001:2013 A.11.2.6",
    "ISO 27001:2013 A.13.1.1",
    "ISO 27001:2013 A.13.2.1",
];

const INSTANCE_FIELDS: &[(&str, &str)] = &[
    ("InstanceId", "/InstanceId"),
    ("InstanceType", "/InstanceType"),
    ("ImageId", "/ImageId"),
    ("VpcId", "/VpcId"),
    ("SubnetId", "/SubnetId"),
    ("PublicIpAddress", "/PublicIpAddress"),
];

const LOAD_BALANCER_FIELDS: &[(&str, &str)] = &[
    ("LoadBalancerName", "/LoadBalancerName"),
    ("DNSName", "/DNSName"),
    ("IpAddressType", "/IpAddressType"),
    ("Scheme", "/Scheme"),
    ("Type", "/Type"),
    ("VpcId", "/VpcId"),
];

const PORT_FIELDS: &[&str] = &["Port", "ServiceName", "StateReason"];

pub fn checks() -> Vec<CheckUnit> {
    vec![
        CheckUnit::new(EC2_SERVICE, ec2_metadata(), ec2_open_ports),
        CheckUnit::new(ELBV2_SERVICE, elbv2_metadata(), elbv2_open_ports),
    ]
}

fn evidence_fields(record_fields: &[(&'static str, &str)], extra: &[&'static str]) -> Vec<&'static str> {
    record_fields
        .iter()
        .map(|(name, _)| *name)
        .chain(extra.iter().copied())
        .chain(PORT_FIELDS.iter().copied())
        .collect()
}

fn ec2_metadata() -> RuleMetadata {
    RuleMetadata::new(
        EC2_OPEN_PORT_CHECK,
        "AttackSurface.EC2",
        "EC2 Instances should not be publicly reachable on {{ServiceName}}",
    )
    .descriptions(
        "EC2 instance {{InstanceId}} is publicly reachable on port {{Port}} which corresponds to the {{ServiceName}} service. \
         The instance is public, a security group rule admits the traffic and a service answers on the host.",
        "EC2 instance {{InstanceId}} is not publicly reachable on port {{Port}} which corresponds to the {{ServiceName}} service \
         due to {{StateReason}}. Instances and their security groups should still be reviewed for minimum necessary access.",
    )
    .severity(Severity::High)
    .remediation(
        "EC2 instances should only open the ports they need, accept traffic from authorized sources only and be hardened further.",
        "https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/authorizing-access-to-an-instance.html",
    )
    .resource_type("AwsEc2Instance")
    .related_requirements(REQUIREMENTS)
    .evidence_fields(&evidence_fields(INSTANCE_FIELDS, &["LaunchedAt"]))
}

fn elbv2_metadata() -> RuleMetadata {
    RuleMetadata::new(
        ELBV2_OPEN_PORT_CHECK,
        "AttackSurface.ELBv2",
        "Application Load Balancers should not be publicly reachable on {{ServiceName}}",
    )
    .descriptions(
        "Application load balancer {{LoadBalancerName}} is publicly reachable on port {{Port}} which corresponds to the \
         {{ServiceName}} service.",
        "Application load balancer {{LoadBalancerName}} is not publicly reachable on port {{Port}} which corresponds to the \
         {{ServiceName}} service due to {{StateReason}}. ALBs and their security groups should still be reviewed for minimum necessary access.",
    )
    .severity(Severity::High)
    .remediation(
        "Restrict the load balancer's security group to the listener ports it serves.",
        "https://docs.aws.amazon.com/elasticloadbalancing/latest/application/load-balancer-update-security-groups.html",
    )
    .resource_type("AwsElbv2LoadBalancer")
    .related_requirements(REQUIREMENTS)
    .evidence_fields(&evidence_fields(LOAD_BALANCER_FIELDS, &[]))
}

/// One port from a scan result
#[derive(Debug, PartialEq)]
struct ScannedPort {
    number: u64,
    open: bool,
    reason: String,
    service: String,
}

impl ScannedPort {
    fn parse(entry: &Value) -> Option<Self> {
        let number = entry.get("Port").and_then(Value::as_u64)?;
        let text = |key: &str| entry.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

        Some(Self {
            number,
            open: text("State") == Some("open"),
            reason: text("Reason").unwrap_or("unknown").to_string(),
            service: service_name(number, text("Service")),
        })
    }

    /// Service name as it appears in a check code
    fn qualifier(&self) -> String {
        self.service
            .chars()
            .map(|c| match c.to_ascii_lowercase() {
                c @ ('a'..='z' | '0'..='9' | '.' | '_' | '-') => c,
                _ => '-',
            })
            .collect()
    }
}

/// Scanners misname a few well-known ports
fn service_name(port: u64, scanned: Option<&str>) -> String {
    match port {
        8089 => "SPLUNKD".to_string(),
        10250 => "KUBERNETES-API".to_string(),
        5672 => "RABBITMQ".to_string(),
        4040 => "SPARK-WEBUI".to_string(),
        _ => scanned.unwrap_or("unknown").to_uppercase(),
    }
}

fn port_verdicts(resource_id: &str, record: &Value, fields: &[(&str, &str)]) -> Vec<Verdict> {
    let Some(scan) = record.get(SCAN_FIELD).and_then(Value::as_array) else {
        return Vec::new();
    };

    scan.iter()
        .filter_map(ScannedPort::parse)
        .enumerate()
        .map(|(index, port)| {
            let verdict = if port.open {
                Verdict::fail(resource_id)
            } else {
                Verdict::pass(resource_id)
            };
            let qualifier = port.qualifier();
            with_record_evidence(verdict, record, fields)
                .with_evidence("Port", port.number)
                .with_evidence("ServiceName", port.service)
                .with_evidence("StateReason", port.reason)
                .itemized(qualifier, index + 1)
        })
        .collect()
}

pub fn ec2_open_ports(env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>> {
    let instances = env.listing(INSTANCES_KEY)?;
    let context = env.context();
    let mut verdicts = Vec::new();

    for instance in instances.iter() {
        let running = instance
            .pointer("/State/Name")
            .and_then(Value::as_str)
            .is_none_or(|state| state == "running");
        let public = instance
            .get("PublicIpAddress")
            .and_then(Value::as_str)
            .is_some_and(|ip| !ip.is_empty());
        if !running || !public {
            continue;
        }

        let Some(instance_id) = instance.get("InstanceId").and_then(Value::as_str) else {
            continue;
        };
        let Ok(arn) = Arn::ec2_instance(
            &context.partition,
            &context.region,
            &context.account_id,
            instance_id,
        ) else {
            continue;
        };

        let launched_at = instance
            .pointer("/BlockDeviceMappings/0/Ebs/AttachTime")
            .or_else(|| instance.get("LaunchTime"))
            .cloned();

        verdicts.extend(
            port_verdicts(&arn.to_string(), instance, INSTANCE_FIELDS)
                .into_iter()
                .map(|v| match &launched_at {
                    Some(at) => v.with_evidence("LaunchedAt", at.clone()),
                    None => v,
                }),
        );
    }

    Ok(verdicts)
}

pub fn elbv2_open_ports(env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>> {
    let load_balancers = env.listing(LOAD_BALANCERS_KEY)?;
    let mut verdicts = Vec::new();

    for lb in load_balancers.iter() {
        let scheme = lb.get("Scheme").and_then(Value::as_str);
        let lb_type = lb.get("Type").and_then(Value::as_str);
        if scheme != Some("internet-facing") || lb_type != Some("application") {
            continue;
        }

        let Some(arn) = lb
            .get("LoadBalancerArn")
            .and_then(Value::as_str)
            .and_then(|value| Arn::parse(value).ok())
        else {
            continue;
        };

        verdicts.extend(port_verdicts(&arn.to_string(), lb, LOAD_BALANCER_FIELDS));
    }

    Ok(verdicts)
}
