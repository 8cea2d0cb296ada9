use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuditResult;
use crate::identifiers::{validate_account_id, validate_partition, validate_region};

/// Account/region scope a check runs against.
///
/// Handed to every check invocation; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub account_id: String,
    pub region: String,
    pub partition: String,
    /// ARN or name of the identity the run executes as
    pub invoker_identity: String,
}

impl ExecutionContext {
    /// Create a validated execution context
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        partition: impl Into<String>,
        invoker_identity: impl Into<String>,
    ) -> AuditResult<Self> {
        let context = Self {
            account_id: account_id.into(),
            region: region.into(),
            partition: partition.into(),
            invoker_identity: invoker_identity.into(),
        };

        validate_account_id(&context.account_id)?;
        validate_region(&context.region)?;
        validate_partition(&context.partition)?;

        Ok(context)
    }

    /// Key identifying the (account, region) scope, used to share one
    /// execution cache between every check of that scope
    pub fn scope_key(&self) -> (String, String) {
        (self.account_id.clone(), self.region.clone())
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.region)
    }
}
