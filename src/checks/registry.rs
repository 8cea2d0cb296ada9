use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use serde::Serialize;
use url::Url;

use super::check::{Check, CheckUnit, RuleMetadata};
use crate::error::{AuditError, AuditResult};
use crate::identifiers::{validate_check_code, validate_service_tag};

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<CheckRegistry> =
        Arc::new(CheckRegistry::from_catalog(super::builtin_catalog()).0);
}

/// A check code registered more than once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCheck {
    pub code: String,
    /// Service tags of every registration, in order
    pub services: Vec<String>,
}

/// Diagnostic produced by a dry registration pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    /// Number of units that would be accepted
    pub accepted: usize,
    pub duplicates: Vec<DuplicateCheck>,
    /// Units rejected by validation, with the reason
    pub rejected: Vec<String>,
}

impl RegistrationReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty() && self.rejected.is_empty()
    }
}

/// Ordered collection of check units grouped by service tag.
///
/// Registration order is preserved within a tag. Registering the same
/// (tag, code) pair again replaces the earlier unit in place and is recorded
/// in [`CheckRegistry::shadowed`].
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    units: Vec<CheckUnit>,
    shadowed: Vec<(String, String)>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry holding the built-in catalog
    pub fn global() -> Arc<CheckRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    /// Build a registry from a catalog, collecting rejections instead of failing
    pub fn from_catalog(units: Vec<CheckUnit>) -> (Self, RegistrationReport) {
        let report = Self::new().dry_register(&units);
        let mut registry = Self::new();
        for unit in units {
            // Rejections are already described in the report
            let _ = registry.register_unit(unit);
        }
        (registry, report)
    }

    /// Register a check under `service_tag`
    pub fn register(
        &mut self,
        service_tag: &str,
        metadata: RuleMetadata,
        check: impl Check + 'static,
    ) -> AuditResult<()> {
        self.register_unit(CheckUnit::new(service_tag, metadata, check))
    }

    pub fn register_unit(&mut self, unit: CheckUnit) -> AuditResult<()> {
        validate_unit(&unit)?;

        let existing = self
            .units
            .iter()
            .position(|u| u.service() == unit.service() && u.code() == unit.code());

        match existing {
            Some(index) => {
                self.shadowed
                    .push((unit.service().to_string(), unit.code().to_string()));
                self.units[index] = unit;
            }
            None => self.units.push(unit),
        }

        Ok(())
    }

    /// Checks registered under `service_tag`, in registration order
    pub fn checks_for(&self, service_tag: &str) -> Vec<CheckUnit> {
        self.units
            .iter()
            .filter(|u| u.service() == service_tag)
            .cloned()
            .collect()
    }

    pub fn all_service_tags(&self) -> BTreeSet<String> {
        self.units.iter().map(|u| u.service().to_string()).collect()
    }

    /// Look up a unit by check code
    pub fn find(&self, code: &str) -> Option<&CheckUnit> {
        self.units.iter().find(|u| u.code() == code)
    }

    pub fn units(&self) -> &[CheckUnit] {
        &self.units
    }

    /// (tag, code) pairs replaced by a later registration
    pub fn shadowed(&self) -> &[(String, String)] {
        &self.shadowed
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Report what registering `candidates` on top of this registry would do,
    /// without modifying it.
    ///
    /// Check codes must be unique across all tags because finding ids embed
    /// only the code.
    pub fn dry_register(&self, candidates: &[CheckUnit]) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for unit in &self.units {
            seen.entry(unit.code().to_string())
                .or_default()
                .push(unit.service().to_string());
        }

        for unit in candidates {
            if let Err(err) = validate_unit(unit) {
                report.rejected.push(err.to_string());
                continue;
            }
            report.accepted += 1;
            seen.entry(unit.code().to_string())
                .or_default()
                .push(unit.service().to_string());
        }

        report.duplicates = seen
            .into_iter()
            .filter(|(_, services)| services.len() > 1)
            .map(|(code, services)| DuplicateCheck { code, services })
            .collect();

        report
    }
}

fn validate_unit(unit: &CheckUnit) -> AuditResult<()> {
    validate_service_tag(unit.service())
        .and_then(|_| validate_check_code(unit.code()))
        .and_then(|_| validate_remediation_url(&unit.metadata().remediation_url))
        .map_err(|err| {
            AuditError::Registration(format!(
                "{}/{}: {}",
                unit.service(),
                unit.code(),
                err
            ))
        })
}

/// Remediation links are optional but must be absolute http(s) URLs
fn validate_remediation_url(value: &str) -> AuditResult<()> {
    if value.is_empty() {
        return Ok(());
    }

    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(AuditError::InvalidIdentifier(format!(
            "remediation url '{}' uses unsupported scheme '{}'",
            value,
            url.scheme()
        ))),
        Err(e) => Err(AuditError::InvalidIdentifier(format!(
            "remediation url '{}' is invalid: {}",
            value, e
        ))),
    }
}
