use std::path::Path;

use anyhow::Result;

use crate::config::AuditConfig;
use crate::context::Context;

pub struct ConfigCommand;

impl ConfigCommand {
    /// Load a configuration file and print the resolved settings
    pub fn execute_validate(ctx: &Context, path: &str) -> Result<()> {
        let config = AuditConfig::load(&*ctx.fs, Path::new(path))?;

        ctx.output.section("Configuration");
        ctx.output.key_value("Partition", &config.partition);
        ctx.output.key_value("Accounts", &config.accounts.join(", "));
        ctx.output.key_value("Regions", &config.regions.join(", "));
        let services = if config.services.is_empty() {
            "all".to_string()
        } else {
            config.services.join(", ")
        };
        ctx.output.key_value("Services", &services);
        ctx.output
            .key_value("Max concurrent checks", &config.max_concurrent_checks.to_string());
        ctx.output
            .key_value("Retry attempts", &config.retry.max_attempts.to_string());
        ctx.output
            .key_value("Remediation role", &config.remediation.role_name);
        ctx.output
            .key_value("Updated by", &config.remediation.updated_by);

        ctx.output.success(&format!(
            "Configuration is valid ({} scope(s))",
            config.accounts.len() * config.regions.len()
        ));
        Ok(())
    }
}
