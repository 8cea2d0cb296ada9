//! Resource provider serving listings recorded in a YAML or JSON file, used
//! for offline audits.
//!
//! ```yaml
//! listings:                 # served to every scope
//!   dax:clusters:
//!     - ClusterName: orders
//!       SSEDescription: { Status: ENABLED }
//! scopes:                   # per "account/region" overrides
//!   111111111111/us-east-1:
//!     ec2:vpcs:
//!       - VpcId: vpc-0abc
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::ExecutionContext;
use crate::error::ProviderError;
use crate::traits::{FileSystem, ResourceProvider, ResourceRecord};

type Listings = HashMap<String, Vec<ResourceRecord>>;

#[derive(Debug, Default, Deserialize)]
pub struct FixtureResourceProvider {
    #[serde(default)]
    listings: Listings,
    #[serde(default)]
    scopes: HashMap<String, Listings>,
}

impl FixtureResourceProvider {
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let content = fs.read_to_string(path)?;
        Self::from_yaml(&content).with_context(|| format!("Invalid fixture file: {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Fixture is not valid YAML or JSON")
    }

    /// Every listing key the fixture can serve
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .listings
            .keys()
            .chain(self.scopes.values().flat_map(|l| l.keys()))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl ResourceProvider for FixtureResourceProvider {
    fn list(
        &self,
        context: &ExecutionContext,
        key: &str,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let scoped = self
            .scopes
            .get(&context.to_string())
            .and_then(|listings| listings.get(key));

        // Unknown keys list nothing, like an account without that service
        Ok(scoped
            .or_else(|| self.listings.get(key))
            .cloned()
            .unwrap_or_default())
    }
}
