//! Canonical finding records, normalization from verdicts, and an in-memory
//! finding store.

pub mod memory;
pub mod model;
pub mod normalizer;

pub use memory::{FindingNote, InMemoryFindingStore};
pub use model::{
    ComplianceStatus, Finding, FindingUpdate, RecordState, Severity, WorkflowStatus, finding_id,
    split_finding_id,
};
pub use normalizer::FindingNormalizer;
