pub mod filesystem;
pub mod finding_sink;
pub mod identity;
pub mod output;
pub mod provisioning;
pub mod resource_provider;

pub use filesystem::{FileSystem, RealFileSystem};
pub use finding_sink::FindingSink;
pub use identity::{CallerIdentity, IdentityProvider};
pub use output::{NullOutput, Output, TerminalOutput};
pub use provisioning::{
    FlowLogRequest, IamRole, LogGroup, ProvisioningApi, ProvisioningFactory,
};
pub use resource_provider::{ResourceProvider, ResourceRecord};

#[cfg(test)]
pub use filesystem::MockFileSystem;
#[cfg(test)]
pub use identity::MockIdentityProvider;
#[cfg(test)]
pub use output::{MockOutput, OutputMessage};
#[cfg(test)]
pub use provisioning::{MockProvisioning, MockProvisioningFactory};
#[cfg(test)]
pub use resource_provider::MockResourceProvider;
