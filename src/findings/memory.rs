use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use super::model::{Finding, FindingUpdate};
use crate::error::ProviderError;
use crate::traits::FindingSink;

/// Note attached to a finding by an update
#[derive(Debug, Clone, PartialEq)]
pub struct FindingNote {
    pub text: String,
    pub updated_by: String,
}

#[derive(Default)]
struct StoreState {
    findings: BTreeMap<String, Finding>,
    notes: BTreeMap<String, Vec<FindingNote>>,
    updates: Vec<FindingUpdate>,
    upsert_calls: usize,
}

/// Finding sink kept in process memory.
///
/// Used by the CLI for local runs and by tests to observe what the engine and
/// orchestrator deliver downstream.
#[derive(Default)]
pub struct InMemoryFindingStore {
    state: Mutex<StoreState>,
    reject_updates: Mutex<Option<ProviderError>>,
}

impl InMemoryFindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `update_finding` fail with `error`
    pub fn reject_updates_with(&self, error: ProviderError) {
        *self.reject_updates.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn get(&self, id: &str) -> Option<Finding> {
        self.lock().findings.get(id).cloned()
    }

    pub fn all(&self) -> Vec<Finding> {
        self.lock().findings.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notes(&self, id: &str) -> Vec<FindingNote> {
        self.lock().notes.get(id).cloned().unwrap_or_default()
    }

    /// Every update received, in order (including ones for unknown ids)
    pub fn updates(&self) -> Vec<FindingUpdate> {
        self.lock().updates.clone()
    }

    pub fn upsert_calls(&self) -> usize {
        self.lock().upsert_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FindingSink for InMemoryFindingStore {
    fn upsert_findings(&self, findings: &[Finding]) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.upsert_calls += 1;
        for finding in findings {
            state.findings.insert(finding.id.clone(), finding.clone());
        }
        Ok(())
    }

    fn update_finding(&self, update: &FindingUpdate) -> Result<(), ProviderError> {
        if let Some(error) = self
            .reject_updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }

        let mut state = self.lock();
        state.updates.push(update.clone());

        // Notifications may reference findings this store never saw
        if let Some(finding) = state.findings.get_mut(&update.finding_id) {
            finding.workflow_status = update.workflow_status;
            finding.record_state = update.record_state;
            finding.updated_at = Utc::now();
        }

        state
            .notes
            .entry(update.finding_id.clone())
            .or_default()
            .push(FindingNote {
                text: update.note.clone(),
                updated_by: update.updated_by.clone(),
            });

        Ok(())
    }

    fn get_findings(&self, ids: &[String]) -> Result<Vec<Finding>, ProviderError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.findings.get(id).cloned())
            .collect())
    }
}
