use anyhow::{Context as _, Result};

use crate::context::Context;
use crate::findings::finding_id;
use crate::identifiers::{Arn, validate_check_code};

pub struct FindingCommand;

impl FindingCommand {
    /// Print the deterministic finding id for a resource and check code
    pub fn execute_id(ctx: &Context, resource_arn: &str, check_code: &str) -> Result<()> {
        let arn = Arn::parse(resource_arn).context("Invalid resource ARN")?;
        validate_check_code(check_code).context("Invalid check code")?;

        if ctx.checks.find(check_code).is_none() {
            ctx.output
                .warning(&format!("Check '{}' is not registered", check_code));
        }

        println!("{}", finding_id(&arn.to_string(), check_code));
        Ok(())
    }
}
