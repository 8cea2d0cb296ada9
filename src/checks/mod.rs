//! Check units, the registry that holds them, and the built-in catalog.

pub mod attack_surface;
pub mod check;
pub mod dax;
pub mod registry;
pub mod vpc;

use serde_json::Value;

pub use check::{Check, CheckEnv, CheckUnit, RuleMetadata, Verdict};
pub use registry::{CheckRegistry, DuplicateCheck, RegistrationReport};

/// Every built-in check, in declaration order
pub fn builtin_catalog() -> Vec<CheckUnit> {
    let mut units = Vec::new();
    units.extend(dax::checks());
    units.extend(vpc::checks());
    units.extend(attack_surface::checks());
    units
}

/// Copy `(name, JSON pointer)` fields present in `record` into the verdict's
/// evidence. Absent or null fields are left out.
pub(crate) fn with_record_evidence(
    mut verdict: Verdict,
    record: &Value,
    fields: &[(&str, &str)],
) -> Verdict {
    for (name, pointer) in fields {
        if let Some(value) = record.pointer(pointer).filter(|v| !v.is_null()) {
            verdict.evidence.insert(name.to_string(), value.clone());
        }
    }
    verdict
}
