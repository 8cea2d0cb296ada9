use anyhow::{Result, bail};

use crate::checks::{CheckRegistry, builtin_catalog};
use crate::context::Context;

pub struct ChecksCommand;

impl ChecksCommand {
    /// List registered checks, optionally for one service tag
    pub fn execute_list(ctx: &Context, service: Option<&str>) -> Result<()> {
        let tags: Vec<String> = match service {
            Some(tag) => vec![tag.to_string()],
            None => ctx.checks.all_service_tags().into_iter().collect(),
        };

        let mut total = 0;
        for tag in &tags {
            let units = ctx.checks.checks_for(tag);
            if units.is_empty() {
                continue;
            }

            ctx.output.section(&format!("Service: {}", tag));
            for unit in &units {
                let metadata = unit.metadata();
                let severity = metadata.severity.unwrap_or_default();
                ctx.output
                    .list_item(&format!("{} [{}] {}", metadata.code, severity, metadata.display_title()));
                if !metadata.related_requirements.is_empty() {
                    ctx.output
                        .dimmed(&format!("    {}", metadata.related_requirements.join(", ")));
                }
            }
            total += units.len();
        }

        if total == 0 {
            ctx.output.info("No checks registered");
        } else {
            ctx.output.success(&format!("{} checks registered", total));
        }

        Ok(())
    }

    /// Dry-register the built-in catalog and fail on duplicate check codes
    pub fn execute_verify(ctx: &Context) -> Result<()> {
        let catalog = builtin_catalog();
        let report = CheckRegistry::new().dry_register(&catalog);

        ctx.output.section("Check Registration");
        ctx.output
            .key_value("Accepted", &report.accepted.to_string());

        for rejected in &report.rejected {
            ctx.output.error(rejected);
        }
        for duplicate in &report.duplicates {
            ctx.output.error(&format!(
                "Duplicate check code '{}' registered by: {}",
                duplicate.code,
                duplicate.services.join(", ")
            ));
        }

        if !report.is_clean() {
            bail!(
                "{} duplicate and {} invalid check registration(s)",
                report.duplicates.len(),
                report.rejected.len()
            );
        }

        ctx.output.success("All check codes are unique");
        Ok(())
    }
}
