use anyhow::Result;

use crate::context::Context;

pub struct PlaybooksCommand;

impl PlaybooksCommand {
    pub fn execute_list(ctx: &Context) -> Result<()> {
        let playbooks = ctx.playbooks.list();

        ctx.output.section("Remediation Playbooks");
        if playbooks.is_empty() {
            ctx.output.info("No playbooks registered");
            return Ok(());
        }

        for playbook in &playbooks {
            ctx.output.list_item(&playbook.check_code);
            ctx.output.dimmed(&format!("    {}", playbook.description));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockFileSystem, MockOutput, OutputMessage};
    use std::sync::Arc;

    #[test]
    fn test_list_builtin_playbooks() {
        let output = Arc::new(MockOutput::new());
        let ctx = Context::test_with(Arc::new(MockFileSystem::new()), output.clone());

        PlaybooksCommand::execute_list(&ctx).unwrap();

        assert!(output
            .get_messages()
            .contains(&OutputMessage::ListItem("vpc-flow-logging-check".to_string())));
    }
}
