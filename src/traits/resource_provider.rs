use serde_json::Value;

use crate::engine::ExecutionContext;
use crate::error::ProviderError;

/// One structured resource record returned by a listing call
pub type ResourceRecord = Value;

/// Read-only listing/describe access to cloud resources.
///
/// Given a listing key (e.g. `"dax:clusters"`) for an account/region scope,
/// returns the sequence of resource records. Implementations wrap the vendor
/// SDK; the engine never calls them without the retry wrapper.
pub trait ResourceProvider: Send + Sync {
    fn list(
        &self,
        context: &ExecutionContext,
        key: &str,
    ) -> Result<Vec<ResourceRecord>, ProviderError>;
}

#[cfg(test)]
pub use mock::MockResourceProvider;

#[cfg(test)]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock provider serving canned listings and counting calls per key
    pub struct MockResourceProvider {
        listings: HashMap<String, Result<Vec<ResourceRecord>, ProviderError>>,
        transient_failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<HashMap<String, usize>>,
        scoped_calls: Mutex<Vec<(String, String)>>,
        delay: Option<Duration>,
    }

    impl MockResourceProvider {
        pub fn new() -> Self {
            Self {
                listings: HashMap::new(),
                transient_failures: Mutex::new(HashMap::new()),
                calls: Mutex::new(HashMap::new()),
                scoped_calls: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        pub fn with_listing(mut self, key: &str, records: Vec<ResourceRecord>) -> Self {
            self.listings.insert(key.to_string(), Ok(records));
            self
        }

        pub fn with_error(mut self, key: &str, error: ProviderError) -> Self {
            self.listings.insert(key.to_string(), Err(error));
            self
        }

        /// Throttle the first `count` calls for `key` before succeeding
        pub fn with_transient_failures(self, key: &str, count: u32) -> Self {
            self.transient_failures
                .lock()
                .unwrap()
                .insert(key.to_string(), count);
            self
        }

        /// Sleep inside every call, to widen race windows in concurrency tests
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self, key: &str) -> usize {
            self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        /// Number of calls for `key` made in the given account
        pub fn call_count_in(&self, account_id: &str, key: &str) -> usize {
            self.scoped_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(account, k)| account == account_id && k == key)
                .count()
        }
    }

    impl ResourceProvider for MockResourceProvider {
        fn list(
            &self,
            context: &ExecutionContext,
            key: &str,
        ) -> Result<Vec<ResourceRecord>, ProviderError> {
            *self.calls.lock().unwrap().entry(key.to_string()).or_insert(0) += 1;
            self.scoped_calls
                .lock()
                .unwrap()
                .push((context.account_id.clone(), key.to_string()));

            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }

            {
                let mut failures = self.transient_failures.lock().unwrap();
                if let Some(remaining) = failures.get_mut(key) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(ProviderError::Throttled(format!("{} throttled", key)));
                    }
                }
            }

            match self.listings.get(key) {
                Some(result) => result.clone(),
                None => Ok(Vec::new()),
            }
        }
    }
}
