use crate::{GlobalArgs, ProjectArgs, utils};
use colored::Colorize;
use nebari_core::{DeployOptions, deploy_configuration, into_stages};
use nebari_stages::DeploySummary;

pub struct DeployArgs {
    pub dns_provider: Option<String>,
    pub dns_auto_provision: bool,
    pub disable_render: bool,
    pub disable_checks: bool,
    pub skip_remote_state_provision: bool,
}

pub async fn handle(global: &GlobalArgs, project: &ProjectArgs, args: &DeployArgs) -> anyhow::Result<()> {
    let mut config = utils::load_config(project.config.as_deref())?;
    if let Some(provider) = &args.dns_provider {
        config.dns.provider = Some(provider.clone());
    }
    if args.dns_auto_provision {
        if config.dns.provider.is_none() {
            anyhow::bail!("--dns-auto-provision needs a DNS provider (--dns-provider or dns.provider)");
        }
        config.dns.auto_provision = true;
    }

    let (factory, resolved) = utils::resolve_stages(global, config, &project.output)?;
    utils::print_stages(&resolved);
    let stages = into_stages(resolved);

    if args.disable_render {
        println!("{}", "Skipping render, deploying the files already on disk".yellow());
    } else {
        utils::render(&stages, &project.output, false)?;
    }

    let options = DeployOptions {
        disable_checks: args.disable_checks,
        skip_remote_state_provision: args.skip_remote_state_provision,
    };

    println!();
    println!("{}", "Deploying Nebari...".blue().bold());
    let outputs = deploy_configuration(&factory.config, &stages, &options).await?;

    println!();
    println!("{}", "✓ Deployment complete".green().bold());
    utils::print_summary(&DeploySummary::from_outputs(&factory.config, &outputs));
    Ok(())
}
