pub mod audit;
pub mod checks;
pub mod config;
pub mod finding;
pub mod playbooks;
pub mod remediation;

pub use audit::AuditCommand;
pub use checks::ChecksCommand;
pub use config::ConfigCommand;
pub use finding::FindingCommand;
pub use playbooks::PlaybooksCommand;
pub use remediation::RemediationCommand;
