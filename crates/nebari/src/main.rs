mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nebari")]
#[command(about = "Deploy and manage a Nebari data science platform", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Stage selection shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Exclude stages whose name fully matches this regex (repeatable)
    #[arg(long = "exclude-stage", global = true)]
    pub exclude_stage: Vec<String>,

    /// Exclude the built-in stages
    #[arg(long, global = true)]
    pub exclude_default_stages: bool,

    /// Directory with per-stage template trees
    #[arg(long, global = true, env = "NEBARI_TEMPLATE_DIR")]
    pub template_dir: Option<PathBuf>,
}

/// Configuration file and output directory.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// nebari-config.yaml (falls back to NEBARI_CONFIG_PATH, then the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output directory for the rendered stages
    #[arg(short, long, default_value = "./")]
    pub output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy every stage
    Deploy {
        #[command(flatten)]
        project: ProjectArgs,
        /// DNS provider used to publish the domain (e.g. cloudflare)
        #[arg(long)]
        dns_provider: Option<String>,
        /// Create or update the DNS record after the ingress stage
        #[arg(long)]
        dns_auto_provision: bool,
        /// Deploy what is already rendered
        #[arg(long)]
        disable_render: bool,
        /// Skip the readiness checks after each stage
        #[arg(long)]
        disable_checks: bool,
        /// Do not deploy the remote state stage
        #[arg(long)]
        skip_remote_state_provision: bool,
    },
    /// Destroy every stage, newest first
    Destroy {
        #[command(flatten)]
        project: ProjectArgs,
        /// Destroy what is already rendered
        #[arg(long)]
        disable_render: bool,
        /// Confirm the destruction
        #[arg(short, long)]
        yes: bool,
    },
    /// Render the stage files into the output directory
    Render {
        #[command(flatten)]
        project: ProjectArgs,
        /// Show the diff without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the configuration file
    Validate {
        /// nebari-config.yaml (falls back to NEBARI_CONFIG_PATH, then the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List the stages that would run
    Stages {
        /// nebari-config.yaml (falls back to NEBARI_CONFIG_PATH, then the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Deploy {
            project,
            dns_provider,
            dns_auto_provision,
            disable_render,
            disable_checks,
            skip_remote_state_provision,
        } => {
            let options = commands::deploy::DeployArgs {
                dns_provider,
                dns_auto_provision,
                disable_render,
                disable_checks,
                skip_remote_state_provision,
            };
            commands::deploy::handle(&cli.global, &project, &options).await?;
        }
        Commands::Destroy {
            project,
            disable_render,
            yes,
        } => {
            commands::destroy::handle(&cli.global, &project, disable_render, yes).await?;
        }
        Commands::Render { project, dry_run } => {
            commands::render::handle(&cli.global, &project, dry_run)?;
        }
        Commands::Validate { config } => {
            commands::validate::handle(config.as_deref())?;
        }
        Commands::Stages { config } => {
            commands::stages::handle(&cli.global, config.as_deref())?;
        }
        Commands::Version => {
            commands::version::handle();
        }
    }

    Ok(())
}
