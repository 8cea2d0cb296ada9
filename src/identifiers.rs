//! Validated construction of cloud identifiers.
//!
//! ARNs and derived resource names are always built through this module so
//! that account ids, regions and partitions are checked in one place.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use sha1::{Digest, Sha1};

use crate::error::{AuditError, AuditResult};

/// Partitions accepted in ARNs and execution contexts
pub const KNOWN_PARTITIONS: &[&str] = &["aws", "aws-cn", "aws-us-gov", "aws-iso", "aws-iso-b"];

/// Maximum length of an IAM role name
pub const MAX_ROLE_NAME_LEN: usize = 64;

/// Maximum length of a managed policy name
pub const MAX_POLICY_NAME_LEN: usize = 128;

lazy_static! {
    static ref ACCOUNT_ID_RE: Regex = Regex::new(r"^\d{12}$").unwrap();
    static ref REGION_RE: Regex = Regex::new(r"^[a-z]{2}(-gov|-iso|-isob)?-[a-z]+-\d{1,2}$").unwrap();
    static ref SERVICE_RE: Regex = Regex::new(r"^[a-z0-9-]+$").unwrap();
    static ref NAME_COMPONENT_RE: Regex = Regex::new(r"^[A-Za-z0-9+=,.@_/-]+$").unwrap();
    static ref CHECK_CODE_RE: Regex = Regex::new(r"^[a-z0-9][a-z0-9._-]*$").unwrap();
}

/// Validate a 12-digit account id
pub fn validate_account_id(account_id: &str) -> AuditResult<()> {
    if ACCOUNT_ID_RE.is_match(account_id) {
        Ok(())
    } else {
        Err(AuditError::InvalidIdentifier(format!(
            "account id '{}' must be 12 digits",
            account_id
        )))
    }
}

/// Validate a region name such as `us-east-1` or `us-gov-west-1`
pub fn validate_region(region: &str) -> AuditResult<()> {
    if REGION_RE.is_match(region) {
        Ok(())
    } else {
        Err(AuditError::InvalidIdentifier(format!(
            "region '{}' is not a valid region name",
            region
        )))
    }
}

/// Validate a partition name
pub fn validate_partition(partition: &str) -> AuditResult<()> {
    if KNOWN_PARTITIONS.contains(&partition) {
        Ok(())
    } else {
        Err(AuditError::InvalidIdentifier(format!(
            "unknown partition '{}'",
            partition
        )))
    }
}

/// Validate a service tag used to group checks (`dax`, `vpc`)
pub fn validate_service_tag(tag: &str) -> AuditResult<()> {
    if SERVICE_RE.is_match(tag) {
        Ok(())
    } else {
        Err(AuditError::InvalidIdentifier(format!(
            "service tag '{}' must be lowercase letters, digits or '-'",
            tag
        )))
    }
}

/// Validate a check code; codes end finding ids so they cannot contain '/'
pub fn validate_check_code(code: &str) -> AuditResult<()> {
    if CHECK_CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(AuditError::InvalidIdentifier(format!(
            "check code '{}' must be lowercase letters, digits, '.', '_' or '-'",
            code
        )))
    }
}

/// Amazon Resource Name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    partition: String,
    service: String,
    region: String,
    account_id: String,
    resource: String,
}

impl Arn {
    /// Build an ARN from validated components.
    ///
    /// `region` and `account_id` may be empty for global services
    /// (e.g. IAM has no region).
    pub fn new(
        partition: &str,
        service: &str,
        region: &str,
        account_id: &str,
        resource: &str,
    ) -> AuditResult<Self> {
        validate_partition(partition)?;

        if !SERVICE_RE.is_match(service) {
            return Err(AuditError::InvalidIdentifier(format!(
                "service '{}' is not a valid ARN service",
                service
            )));
        }

        if !region.is_empty() {
            validate_region(region)?;
        }

        if !account_id.is_empty() {
            validate_account_id(account_id)?;
        }

        if resource.is_empty() {
            return Err(AuditError::InvalidIdentifier(
                "ARN resource cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            partition: partition.to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            resource: resource.to_string(),
        })
    }

    /// ARN of an IAM role
    pub fn iam_role(partition: &str, account_id: &str, role_name: &str) -> AuditResult<Self> {
        validate_name_component(role_name)?;
        Self::new(partition, "iam", "", account_id, &format!("role/{}", role_name))
    }

    /// ARN of a VPC
    pub fn vpc(partition: &str, region: &str, account_id: &str, vpc_id: &str) -> AuditResult<Self> {
        validate_name_component(vpc_id)?;
        Self::new(partition, "ec2", region, account_id, &format!("vpc/{}", vpc_id))
    }

    /// ARN of an EC2 instance
    pub fn ec2_instance(
        partition: &str,
        region: &str,
        account_id: &str,
        instance_id: &str,
    ) -> AuditResult<Self> {
        validate_name_component(instance_id)?;
        Self::new(partition, "ec2", region, account_id, &format!("instance/{}", instance_id))
    }

    /// ARN of the default finding product for an account
    pub fn finding_product(partition: &str, region: &str, account_id: &str) -> AuditResult<Self> {
        Self::new(
            partition,
            "securityhub",
            region,
            account_id,
            &format!("product/{}/default", account_id),
        )
    }

    /// Parse an ARN string
    pub fn parse(value: &str) -> AuditResult<Self> {
        let mut parts = value.splitn(6, ':');
        let prefix = parts.next();
        let fields: Vec<&str> = parts.collect();

        if prefix != Some("arn") || fields.len() != 5 {
            return Err(AuditError::InvalidIdentifier(format!(
                "'{}' is not an ARN",
                value
            )));
        }

        Self::new(fields[0], fields[1], fields[2], fields[3], fields[4])
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Trailing identifier of the resource (`vpc/vpc-123` -> `vpc-123`)
    pub fn resource_id(&self) -> &str {
        self.resource
            .rsplit(['/', ':'])
            .next()
            .unwrap_or(&self.resource)
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}

impl FromStr for Arn {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Arn::parse(s)
    }
}

fn validate_name_component(value: &str) -> AuditResult<()> {
    if NAME_COMPONENT_RE.is_match(value) {
        Ok(())
    } else {
        Err(AuditError::InvalidIdentifier(format!(
            "'{}' contains characters not allowed in resource names",
            value
        )))
    }
}

/// Deterministic resource name `{prefix}{id}` bounded to `max_len`.
///
/// Names that would exceed the limit keep a truncated id and get an 8-char
/// SHA1 suffix of the full id, so the same id always maps to the same name.
pub fn bounded_name(prefix: &str, id: &str, max_len: usize) -> AuditResult<String> {
    validate_name_component(id)?;

    let full = format!("{}{}", prefix, id);
    if full.len() <= max_len {
        return Ok(full);
    }

    let mut hasher = Sha1::new();
    hasher.update(id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let suffix = &digest[..8];

    // prefix + truncated id + "-" + suffix
    let budget = max_len
        .checked_sub(prefix.len() + 1 + suffix.len())
        .ok_or_else(|| {
            AuditError::InvalidIdentifier(format!(
                "prefix '{}' leaves no room for an id within {} characters",
                prefix, max_len
            ))
        })?;

    Ok(format!("{}{}-{}", prefix, &id[..budget.min(id.len())], suffix))
}
