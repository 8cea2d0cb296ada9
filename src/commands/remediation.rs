use std::path::Path;

use anyhow::{Context as _, Result, bail};
use serde_json::Value;

use crate::context::Context;
use crate::remediation::parse_finding_event;

pub struct RemediationCommand;

impl RemediationCommand {
    /// Show what remediation would run for each finding in a finding event,
    /// without calling any provider
    pub fn execute_plan(ctx: &Context, event_path: &str) -> Result<()> {
        let content = ctx.fs.read_to_string(Path::new(event_path))?;
        let event: Value = serde_json::from_str(&content)
            .with_context(|| format!("Event is not valid JSON: {}", event_path))?;
        let requests = parse_finding_event(&event)?;

        if requests.is_empty() {
            ctx.output.info("Event contains no findings");
            return Ok(());
        }

        let mut planned = 0;
        for request in &requests {
            ctx.output.section(&format!("Finding: {}", request.finding_id));
            ctx.output.key_value("Account", &request.account_id);
            ctx.output.key_value("Region", &request.region);
            ctx.output.key_value("Check", &request.check_code);
            ctx.output.key_value("Resource", request.resource_id());

            let playbook = match ctx.playbooks.get(&request.check_code) {
                Ok(playbook) => playbook,
                Err(e) => {
                    ctx.output.warning(&e.to_string());
                    continue;
                }
            };

            let pipeline = playbook.pipeline(request)?;
            ctx.output.dimmed(&playbook.description);
            for (index, step) in pipeline.step_names().iter().enumerate() {
                ctx.output.list_item(&format!("{}. {}", index + 1, step));
            }
            planned += 1;
        }

        if planned == 0 {
            bail!("No finding in {} has a remediation playbook", event_path);
        }

        ctx.output.success(&format!(
            "{} of {} finding(s) can be remediated",
            planned,
            requests.len()
        ));
        Ok(())
    }
}
