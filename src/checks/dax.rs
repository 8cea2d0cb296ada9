//! DynamoDB Accelerator (DAX) encryption checks.

use serde_json::Value;

use super::check::{CheckEnv, CheckUnit, RuleMetadata, Verdict};
use super::with_record_evidence;
use crate::error::AuditResult;
use crate::findings::Severity;
use crate::identifiers::Arn;

pub const SERVICE: &str = "dax";

/// Listing key for DescribeClusters output
pub const CLUSTERS_KEY: &str = "dax:clusters";

const RESOURCE_TYPE: &str = "AwsDaxCluster";

/// Evidence keys and the JSON pointer each is read from
const CLUSTER_FIELDS: &[(&str, &str)] = &[
    ("ClusterName", "/ClusterName"),
    ("TotalNodes", "/TotalNodes"),
    ("NodeType", "/NodeType"),
    ("Status", "/Status"),
    ("Address", "/ClusterDiscoveryEndpoint/Address"),
    ("Port", "/ClusterDiscoveryEndpoint/Port"),
    ("URL", "/ClusterDiscoveryEndpoint/URL"),
    ("SubnetGroup", "/SubnetGroup"),
    ("SecurityGroupIdentifier", "/SecurityGroups/0/SecurityGroupIdentifier"),
    ("IamRoleArn", "/IamRoleArn"),
    ("ParameterGroupName", "/ParameterGroup/ParameterGroupName"),
];

pub fn checks() -> Vec<CheckUnit> {
    vec![
        CheckUnit::new(SERVICE, encryption_at_rest_metadata(), dax_encryption_at_rest),
        CheckUnit::new(SERVICE, encryption_in_transit_metadata(), dax_encryption_in_transit),
    ]
}

fn evidence_fields() -> Vec<&'static str> {
    let mut fields: Vec<&str> = CLUSTER_FIELDS.iter().map(|(name, _)| *name).collect();
    fields.push("EncryptionStatus");
    fields
}

fn encryption_at_rest_metadata() -> RuleMetadata {
    RuleMetadata::new(
        "dax-encryption-at-rest-check",
        "DAX.1",
        "DAX clusters should have encryption at rest enabled",
    )
    .descriptions(
        "DAX cluster {{ClusterName}} does not have encryption at rest enabled (status: {{EncryptionStatus}}). \
         Encryption at rest protects cached data on disk and must be chosen when the cluster is created.",
        "DAX cluster {{ClusterName}} has encryption at rest enabled.",
    )
    .severity(Severity::High)
    .remediation(
        "DAX encryption at rest can only be enabled at cluster creation; recreate the cluster with server-side encryption enabled.",
        "https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/DAXEncryptionAtRest.html",
    )
    .resource_type(RESOURCE_TYPE)
    .related_requirements(&[
        "NIST CSF PR.DS-1",
        "NIST SP 800-53 MP-8",
        "NIST SP 800-53 SC-12",
        "NIST SP 800-53 SC-28",
        "AICPA TSC CC6.1",
        "ISO 27001:2013 A.8.2.3",
    ])
    .evidence_fields(&evidence_fields())
}

fn encryption_in_transit_metadata() -> RuleMetadata {
    RuleMetadata::new(
        "dax-encryption-in-transit-check",
        "DAX.2",
        "DAX clusters should enforce encryption in transit",
    )
    .descriptions(
        "DAX cluster {{ClusterName}} does not encrypt client traffic (endpoint encryption: {{EncryptionStatus}}). \
         Without TLS, cached items travel in clear text between clients and cluster nodes.",
        "DAX cluster {{ClusterName}} enforces TLS on its cluster endpoint.",
    )
    .severity(Severity::High)
    .remediation(
        "DAX encryption in transit can only be enabled at cluster creation; recreate the cluster with endpoint encryption type TLS.",
        "https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/DAXEncryptionInTransit.html",
    )
    .resource_type(RESOURCE_TYPE)
    .related_requirements(&[
        "NIST CSF PR.DS-2",
        "NIST SP 800-53 SC-8",
        "NIST SP 800-53 SC-11",
        "NIST SP 800-53 SC-12",
        "AICPA TSC CC6.1",
        "ISO 27001:2013 A.8.2.3",
        "ISO 27001:2013 A.13.1.1",
        "ISO 27001:2013 A.13.2.1",
        "ISO 27001:2013 A.13.2.3",
        "ISO 27001:2013 A.14.1.2",
        "ISO 27001:2013 A.14.1.3",
    ])
    .evidence_fields(&evidence_fields())
}

/// Cluster ARN, falling back to one built from the cluster name
fn cluster_arn(env: &CheckEnv<'_>, cluster: &Value) -> Option<String> {
    if let Some(arn) = cluster.get("ClusterArn").and_then(Value::as_str) {
        return Some(arn.to_string());
    }

    let name = cluster.get("ClusterName").and_then(Value::as_str)?;
    let context = env.context();
    Arn::new(
        &context.partition,
        "dax",
        &context.region,
        &context.account_id,
        &format!("cache/{}", name),
    )
    .ok()
    .map(|arn| arn.to_string())
}

pub fn dax_encryption_at_rest(env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>> {
    let clusters = env.listing(CLUSTERS_KEY)?;
    let mut verdicts = Vec::new();

    for cluster in clusters.iter() {
        let Some(arn) = cluster_arn(env, cluster) else {
            continue;
        };

        let status = cluster
            .pointer("/SSEDescription/Status")
            .and_then(Value::as_str)
            .unwrap_or("DISABLED");
        let encrypted = matches!(status, "ENABLED" | "ENABLING");

        let verdict = if encrypted {
            Verdict::pass(arn)
        } else {
            Verdict::fail(arn)
        };
        verdicts.push(
            with_record_evidence(verdict, cluster, CLUSTER_FIELDS)
                .with_evidence("EncryptionStatus", status),
        );
    }

    Ok(verdicts)
}

pub fn dax_encryption_in_transit(env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>> {
    let clusters = env.listing(CLUSTERS_KEY)?;
    let mut verdicts = Vec::new();

    for cluster in clusters.iter() {
        let Some(arn) = cluster_arn(env, cluster) else {
            continue;
        };

        // Clusters created before the option existed report nothing: plaintext
        let endpoint_encryption = cluster
            .get("ClusterEndpointEncryptionType")
            .and_then(Value::as_str)
            .unwrap_or("NONE");

        let verdict = if endpoint_encryption == "NONE" {
            Verdict::fail(arn)
        } else {
            Verdict::pass(arn)
        };
        verdicts.push(
            with_record_evidence(verdict, cluster, CLUSTER_FIELDS)
                .with_evidence("EncryptionStatus", endpoint_encryption),
        );
    }

    Ok(verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExecutionCache, ExecutionContext, RetryPolicy};
    use crate::traits::MockResourceProvider;
    use serde_json::json;

    fn context() -> ExecutionContext {
        ExecutionContext::new("111111111111", "us-east-1", "aws", "auditor").unwrap()
    }

    fn clusters() -> Vec<Value> {
        vec![
            json!({
                "ClusterName": "encrypted",
                "ClusterArn": "arn:aws:dax:us-east-1:111111111111:cache/encrypted",
                "TotalNodes": 3,
                "NodeType": "dax.r5.large",
                "Status": "available",
                "ClusterDiscoveryEndpoint": {"Address": "encrypted.dax", "Port": 9111, "URL": "daxs://encrypted.dax"},
                "SSEDescription": {"Status": "ENABLED"},
                "ClusterEndpointEncryptionType": "TLS"
            }),
            json!({
                "ClusterName": "legacy",
                "Status": "available",
                "SSEDescription": {"Status": "DISABLED"}
            }),
        ]
    }

    fn run(check: fn(&CheckEnv<'_>) -> AuditResult<Vec<Verdict>>) -> (Vec<Verdict>, MockResourceProvider) {
        let provider = MockResourceProvider::new().with_listing(CLUSTERS_KEY, clusters());
        let cache = ExecutionCache::new();
        let context = context();
        let retry = RetryPolicy::immediate(1);
        let verdicts = {
            let env = CheckEnv::new(&context, &cache, &provider, &retry);
            check(&env).unwrap()
        };
        (verdicts, provider)
    }

    #[test]
    fn test_encryption_at_rest() {
        let (verdicts, _) = run(dax_encryption_at_rest);

        assert_eq!(verdicts.len(), 2);
        assert!(verdicts[0].passed);
        assert!(!verdicts[1].passed);
        assert_eq!(verdicts[1].evidence["EncryptionStatus"], json!("DISABLED"));
    }

    #[test]
    fn test_encryption_in_transit_defaults_to_none() {
        let (verdicts, _) = run(dax_encryption_in_transit);

        assert!(verdicts[0].passed);
        assert!(!verdicts[1].passed);
        assert_eq!(verdicts[1].evidence["EncryptionStatus"], json!("NONE"));
    }

    #[test]
    fn test_arn_is_derived_from_name_when_missing() {
        let (verdicts, _) = run(dax_encryption_at_rest);

        assert_eq!(
            verdicts[1].resource_id,
            "arn:aws:dax:us-east-1:111111111111:cache/legacy"
        );
    }

    #[test]
    fn test_evidence_is_extracted_from_nested_fields() {
        let (verdicts, _) = run(dax_encryption_at_rest);

        let evidence = &verdicts[0].evidence;
        assert_eq!(evidence["Port"], json!(9111));
        assert_eq!(evidence["URL"], json!("daxs://encrypted.dax"));
        assert!(!evidence.contains_key("IamRoleArn"));
    }

    #[test]
    fn test_both_checks_share_one_listing() {
        let provider = MockResourceProvider::new().with_listing(CLUSTERS_KEY, clusters());
        let cache = ExecutionCache::new();
        let context = context();
        let retry = RetryPolicy::immediate(1);
        let env = CheckEnv::new(&context, &cache, &provider, &retry);

        for unit in checks() {
            unit.evaluate(&env).unwrap();
        }

        assert_eq!(provider.call_count(CLUSTERS_KEY), 1);
    }
}
