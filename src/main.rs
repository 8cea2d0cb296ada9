use anyhow::Result;
use clap::{Parser, Subcommand};
use compliance_orchestrator::commands::{
    AuditCommand, ChecksCommand, ConfigCommand, FindingCommand, PlaybooksCommand,
    RemediationCommand,
};
use compliance_orchestrator::context::Context;

#[derive(Parser)]
#[command(name = "cco")]
#[command(about = "Compliance check orchestration - audit cloud accounts and remediate findings", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run compliance checks against recorded resource listings
    Audit {
        /// Path to the audit configuration file
        #[arg(short, long, env = "CCO_CONFIG", default_value = "cco.yaml")]
        config: String,

        /// Path to a YAML or JSON fixture with resource listings
        #[arg(short, long)]
        fixtures: String,

        /// Only run checks for these service tags (repeatable)
        #[arg(short, long = "service")]
        services: Vec<String>,

        /// Print findings as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Inspect the check catalog
    Checks {
        #[command(subcommand)]
        command: ChecksSubcommand,
    },

    /// Configuration file helpers
    Config {
        #[command(subcommand)]
        command: ConfigSubcommand,
    },

    /// Finding helpers
    Finding {
        #[command(subcommand)]
        command: FindingSubcommand,
    },

    /// List remediation playbooks
    Playbooks,

    /// Remediation helpers
    Remediation {
        #[command(subcommand)]
        command: RemediationSubcommand,
    },
}

#[derive(Subcommand)]
enum ChecksSubcommand {
    /// List registered checks
    List {
        /// Only list checks for this service tag
        #[arg(short, long)]
        service: Option<String>,
    },

    /// Fail if two checks share a check code
    Verify,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "cco.yaml")]
        path: String,
    },
}

#[derive(Subcommand)]
enum FindingSubcommand {
    /// Print the finding id for a resource ARN and check code
    Id {
        /// Resource ARN
        arn: String,

        /// Check code
        check: String,
    },
}

#[derive(Subcommand)]
enum RemediationSubcommand {
    /// Show the remediation steps a finding event would trigger
    Plan {
        /// Path to the finding event JSON
        event: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = Context::new();

    match cli.command {
        Commands::Audit {
            config,
            fixtures,
            services,
            json,
        } => {
            AuditCommand::execute(&ctx, &config, &fixtures, &services, json).await?;
        }
        Commands::Checks { command } => match command {
            ChecksSubcommand::List { service } => {
                ChecksCommand::execute_list(&ctx, service.as_deref())?;
            }
            ChecksSubcommand::Verify => {
                ChecksCommand::execute_verify(&ctx)?;
            }
        },
        Commands::Config { command } => match command {
            ConfigSubcommand::Validate { path } => {
                ConfigCommand::execute_validate(&ctx, &path)?;
            }
        },
        Commands::Finding { command } => match command {
            FindingSubcommand::Id { arn, check } => {
                FindingCommand::execute_id(&ctx, &arn, &check)?;
            }
        },
        Commands::Playbooks => {
            PlaybooksCommand::execute_list(&ctx)?;
        }
        Commands::Remediation { command } => match command {
            RemediationSubcommand::Plan { event } => {
                RemediationCommand::execute_plan(&ctx, &event)?;
            }
        },
    }

    Ok(())
}
