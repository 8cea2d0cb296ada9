use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::AuditResult;
use crate::traits::ResourceRecord;

/// Shared, immutable result of one listing call
pub type Listing = Arc<Vec<ResourceRecord>>;

type Slot = Arc<OnceLock<AuditResult<Listing>>>;

/// Memoizes listing results for one (account, region) run.
///
/// Concurrent callers asking for the same key wait for a single fetch and
/// all observe its result; failures are memoized too, so every check that
/// depends on a failed key sees the same error. The cache is dropped with
/// the run and never outlives it.
#[derive(Default)]
pub struct ExecutionCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ExecutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached listing for `key`, running `fetch` at most once.
    ///
    /// `fetch` must not call back into the cache for the same key.
    pub fn get_or_compute<F>(&self, key: &str, fetch: F) -> AuditResult<Listing>
    where
        F: FnOnce() -> AuditResult<Vec<ResourceRecord>>,
    {
        // The map lock only guards slot lookup; the fetch runs outside it so
        // distinct keys populate in parallel.
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.to_string()).or_default().clone()
        };

        slot.get_or_init(|| fetch().map(Arc::new)).clone()
    }

    /// Whether `key` has a settled (fetched or failed) entry
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Keys with a settled entry, sorted
    pub fn keys(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
