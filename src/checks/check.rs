use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::engine::{ExecutionCache, ExecutionContext, Listing, RetryPolicy, retry_with_backoff};
use crate::error::{AuditError, AuditResult};
use crate::findings::Severity;
use crate::traits::ResourceProvider;

/// Pass/fail outcome for one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// ARN of the evaluated resource
    pub resource_id: String,
    pub passed: bool,
    /// Raw evidence, rendered into the finding's details and description
    pub evidence: BTreeMap<String, Value>,
    /// Set by checks that report one finding per discovered item, e.g. per
    /// open port: becomes part of the finding's check code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_qualifier: Option<String>,
    /// 1-based position appended to the rule label, `[AttackSurface.EC2.2]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_index: Option<usize>,
}

impl Verdict {
    pub fn pass(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            passed: true,
            evidence: BTreeMap::new(),
            code_qualifier: None,
            label_index: None,
        }
    }

    pub fn fail(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            passed: false,
            evidence: BTreeMap::new(),
            code_qualifier: None,
            label_index: None,
        }
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.evidence.insert(key.into(), value.into());
        self
    }

    /// Report this verdict as item `index` of the rule, under its own code
    pub fn itemized(mut self, qualifier: impl Into<String>, index: usize) -> Self {
        self.code_qualifier = Some(qualifier.into());
        self.label_index = Some(index);
        self
    }
}

/// Static description of a check, used to build findings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMetadata {
    /// Stable identifier embedded in finding ids, e.g. `dax-encryption-at-rest-check`
    pub code: String,
    /// Short human label, e.g. `DAX.1`
    pub label: String,
    pub title: String,
    /// Description template for failing resources (`{{Field}}` placeholders)
    pub fail_description: String,
    /// Description template for passing resources
    pub pass_description: String,
    /// Severity of a failing result; `None` falls back to the default label
    pub severity: Option<Severity>,
    pub confidence: u8,
    pub remediation_text: String,
    pub remediation_url: String,
    pub resource_type: String,
    pub related_requirements: Vec<String>,
    /// Evidence keys always present in the finding's resource details
    pub evidence_fields: Vec<String>,
}

impl RuleMetadata {
    pub fn new(code: impl Into<String>, label: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
            title: title.into(),
            fail_description: String::new(),
            pass_description: String::new(),
            severity: None,
            confidence: 99,
            remediation_text: String::new(),
            remediation_url: String::new(),
            resource_type: String::new(),
            related_requirements: Vec::new(),
            evidence_fields: Vec::new(),
        }
    }

    pub fn descriptions(mut self, fail: impl Into<String>, pass: impl Into<String>) -> Self {
        self.fail_description = fail.into();
        self.pass_description = pass.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn remediation(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.remediation_text = text.into();
        self.remediation_url = url.into();
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    pub fn related_requirements(mut self, requirements: &[&str]) -> Self {
        self.related_requirements = requirements.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn evidence_fields(mut self, fields: &[&str]) -> Self {
        self.evidence_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Finding title, `[DAX.1] ...`
    pub fn display_title(&self) -> String {
        if self.label.is_empty() {
            self.title.clone()
        } else {
            format!("[{}] {}", self.label, self.title)
        }
    }

    /// Check code of the finding built from `verdict`.
    ///
    /// A qualifier goes before a trailing `-check`:
    /// `attack-surface-ec2-open-check` + `ssh` is
    /// `attack-surface-ec2-open-ssh-check`.
    pub fn code_for(&self, verdict: &Verdict) -> String {
        let Some(qualifier) = verdict.code_qualifier.as_deref() else {
            return self.code.clone();
        };
        match self.code.strip_suffix("-check") {
            Some(stem) => format!("{}-{}-check", stem, qualifier),
            None => format!("{}-{}", self.code, qualifier),
        }
    }

    /// Title of the finding built from `verdict`, still unrendered
    pub fn title_for(&self, verdict: &Verdict) -> String {
        match verdict.label_index {
            Some(index) if !self.label.is_empty() => {
                format!("[{}.{}] {}", self.label, index, self.title)
            }
            _ => self.display_title(),
        }
    }
}

/// Everything a check may read while evaluating one scope
pub struct CheckEnv<'a> {
    context: &'a ExecutionContext,
    cache: &'a ExecutionCache,
    provider: &'a dyn ResourceProvider,
    retry: &'a RetryPolicy,
}

impl<'a> CheckEnv<'a> {
    pub fn new(
        context: &'a ExecutionContext,
        cache: &'a ExecutionCache,
        provider: &'a dyn ResourceProvider,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            context,
            cache,
            provider,
            retry,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        self.context
    }

    /// Listing for `key`, fetched at most once per scope with retry
    pub fn listing(&self, key: &str) -> AuditResult<Listing> {
        self.cache.get_or_compute(key, || {
            retry_with_backoff(self.retry, || self.provider.list(self.context, key)).map_err(
                |failure| AuditError::Fetch {
                    key: key.to_string(),
                    attempts: failure.attempts,
                    source: failure.error,
                },
            )
        })
    }
}

/// A compliance rule evaluated against one scope
pub trait Check: Send + Sync {
    fn evaluate(&self, env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>>;
}

impl<F> Check for F
where
    F: Fn(&CheckEnv<'_>) -> AuditResult<Vec<Verdict>> + Send + Sync,
{
    fn evaluate(&self, env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>> {
        self(env)
    }
}

/// A registered check: service tag, metadata and implementation
#[derive(Clone)]
pub struct CheckUnit {
    service: String,
    metadata: Arc<RuleMetadata>,
    check: Arc<dyn Check>,
}

impl CheckUnit {
    pub fn new(service: impl Into<String>, metadata: RuleMetadata, check: impl Check + 'static) -> Self {
        Self {
            service: service.into(),
            metadata: Arc::new(metadata),
            check: Arc::new(check),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn code(&self) -> &str {
        &self.metadata.code
    }

    pub fn metadata(&self) -> &RuleMetadata {
        &self.metadata
    }

    pub fn evaluate(&self, env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>> {
        self.check.evaluate(env)
    }
}

impl fmt::Debug for CheckUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckUnit")
            .field("service", &self.service)
            .field("code", &self.metadata.code)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::traits::MockResourceProvider;
    use serde_json::json;

    fn context() -> ExecutionContext {
        ExecutionContext::new("111111111111", "us-east-1", "aws", "auditor").unwrap()
    }

    #[test]
    fn test_listing_retries_transient_failures() {
        let provider = MockResourceProvider::new()
            .with_listing("dax:clusters", vec![json!({"ClusterName": "a"})])
            .with_transient_failures("dax:clusters", 2);
        let cache = ExecutionCache::new();
        let context = context();
        let retry = RetryPolicy::immediate(3);
        let env = CheckEnv::new(&context, &cache, &provider, &retry);

        let listing = env.listing("dax:clusters").unwrap();

        assert_eq!(listing.len(), 1);
        assert_eq!(provider.call_count("dax:clusters"), 3);
    }

    #[test]
    fn test_listing_reports_fetch_error_after_budget() {
        let provider = MockResourceProvider::new().with_transient_failures("ec2:vpcs", 10);
        let cache = ExecutionCache::new();
        let context = context();
        let retry = RetryPolicy::immediate(2);
        let env = CheckEnv::new(&context, &cache, &provider, &retry);

        match env.listing("ec2:vpcs") {
            Err(AuditError::Fetch {
                key,
                attempts,
                source,
            }) => {
                assert_eq!(key, "ec2:vpcs");
                assert_eq!(attempts, 2);
                assert!(matches!(source, ProviderError::Throttled(_)));
            }
            other => panic!("unexpected result: {:?}", other.map(|l| l.len())),
        }

        // Memoized: a second read does not call the provider again
        assert!(env.listing("ec2:vpcs").is_err());
        assert_eq!(provider.call_count("ec2:vpcs"), 2);
    }

    fn always_pass(_env: &CheckEnv<'_>) -> AuditResult<Vec<Verdict>> {
        Ok(vec![Verdict::pass("arn:aws:test:::thing")])
    }

    #[test]
    fn test_functions_are_check_units() {
        let unit = CheckUnit::new(
            "test",
            RuleMetadata::new("always-pass", "T.1", "Always passes"),
            always_pass,
        );

        let provider = MockResourceProvider::new();
        let cache = ExecutionCache::new();
        let context = context();
        let retry = RetryPolicy::immediate(1);
        let env = CheckEnv::new(&context, &cache, &provider, &retry);

        let verdicts = unit.evaluate(&env).unwrap();
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].passed);
        assert_eq!(unit.code(), "always-pass");
        assert_eq!(unit.metadata().display_title(), "[T.1] Always passes");
    }

    #[test]
    fn test_itemized_verdict_code_and_title() {
        let metadata = RuleMetadata::new(
            "attack-surface-ec2-open-check",
            "AttackSurface.EC2",
            "Reachable on {{ServiceName}}",
        );
        let arn = "arn:aws:ec2:us-east-1:111111111111:instance/i-1";

        let plain = Verdict::fail(arn);
        let itemized = Verdict::fail(arn).itemized("ssh", 2);

        assert_eq!(metadata.code_for(&plain), "attack-surface-ec2-open-check");
        assert_eq!(metadata.code_for(&itemized), "attack-surface-ec2-open-ssh-check");
        assert_eq!(metadata.title_for(&plain), "[AttackSurface.EC2] Reachable on {{ServiceName}}");
        assert_eq!(metadata.title_for(&itemized), "[AttackSurface.EC2.2] Reachable on {{ServiceName}}");

        let unsuffixed = RuleMetadata::new("open-ports", "", "Open");
        assert_eq!(unsuffixed.code_for(&itemized), "open-ports-ssh");
        assert_eq!(unsuffixed.title_for(&itemized), "Open");
    }
}
