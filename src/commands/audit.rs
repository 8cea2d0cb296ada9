use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::config::AuditConfig;
use crate::context::Context;
use crate::engine::{AuditEngine, RunReport};
use crate::findings::InMemoryFindingStore;
use crate::fixture::FixtureResourceProvider;
use crate::identifiers::validate_service_tag;

pub struct AuditCommand;

impl AuditCommand {
    /// Run the selected checks over every configured scope, reading
    /// resources from a fixture file
    pub async fn execute(
        ctx: &Context,
        config_path: &str,
        fixtures_path: &str,
        services: &[String],
        json: bool,
    ) -> Result<()> {
        let config = AuditConfig::load(&*ctx.fs, Path::new(config_path))?;
        for service in services {
            validate_service_tag(service)?;
        }
        let services = if services.is_empty() {
            config.services.clone()
        } else {
            services.to_vec()
        };

        let provider = Arc::new(FixtureResourceProvider::load(&*ctx.fs, Path::new(fixtures_path))?);
        let store = Arc::new(InMemoryFindingStore::new());
        let engine = AuditEngine::new(
            ctx.checks.clone(),
            provider,
            store.clone(),
            ctx.output.clone(),
            config.audit_settings(),
        );

        let scopes = config.scopes(&whoami::username())?;
        let report = engine.run(&scopes, &services).await;

        if json {
            let findings: Vec<_> = report.findings().collect();
            println!("{}", serde_json::to_string_pretty(&findings)?);
        } else {
            Self::print_report(ctx, &report, store.len());
        }

        let failed = report.summary.checks_failed;
        if failed > 0 {
            bail!("{} check evaluation(s) failed", failed);
        }

        Ok(())
    }

    fn print_report(ctx: &Context, report: &RunReport, stored: usize) {
        let failing: Vec<_> = report.failed_findings().collect();
        if !failing.is_empty() {
            ctx.output.section("Failed Findings");
            for finding in failing {
                ctx.output.list_item(&format!(
                    "[{}] {} ({})",
                    finding.severity, finding.title, finding.resource_id
                ));
            }
        }

        let summary = &report.summary;
        ctx.output.section("Audit Summary");
        ctx.output.key_value("Scopes", &summary.scopes.to_string());
        ctx.output
            .key_value("Checks run", &summary.checks_run.to_string());
        ctx.output
            .key_value("Checks failed", &summary.checks_failed.to_string());
        ctx.output
            .key_value("Passed findings", &summary.passed_findings.to_string());
        ctx.output
            .key_value("Failed findings", &summary.failed_findings.to_string());
        ctx.output.key_value("Findings stored", &stored.to_string());
        ctx.output.key_value(
            "Compliance score",
            &format!("{:.1}%", summary.compliance_score()),
        );

        if summary.failed_findings == 0 && summary.checks_failed == 0 {
            ctx.output.success("All evaluated resources are compliant");
        }
    }
}
