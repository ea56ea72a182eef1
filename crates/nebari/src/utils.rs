use crate::GlobalArgs;
use anyhow::Context;
use colored::Colorize;
use nebari_config::NebariConfig;
use nebari_core::{RegisteredStage, RenderDiff, Stage, StageFactory, StageFilter, StageRegistry};
use nebari_stages::{BuiltinStages, DeploySummary};
use nebari_tofu::Tofu;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Finds and reads the configuration, applying `NEBARI_SECRET` overrides.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<NebariConfig> {
    let path = nebari_config::find_config_file(explicit)?;
    let config = nebari_config::read_configuration(&path, true)
        .with_context(|| format!("failed to load {}", path.display()))?;
    println!("Configuration: {}", path.display().to_string().cyan());
    Ok(config)
}

/// Registers the providers and resolves the stage list for one run.
pub fn resolve_stages(
    global: &GlobalArgs,
    config: NebariConfig,
    output: &Path,
) -> anyhow::Result<(StageFactory, Vec<RegisteredStage>)> {
    let factory = StageFactory::new(output, Arc::new(config), Arc::new(Tofu::from_env()))
        .with_template_root(global.template_dir.clone());

    let registry = StageRegistry::new().with_provider(Box::new(BuiltinStages));
    let filter = StageFilter {
        exclude: global.exclude_stage.clone(),
        exclude_default_stages: global.exclude_default_stages,
    };
    let stages = registry.resolve(&factory, &filter)?;
    Ok((factory, stages))
}

pub fn print_stages(stages: &[RegisteredStage]) {
    println!();
    println!("{}", format!("Stages ({}):", stages.len()).bold());
    for entry in stages {
        println!(
            "  {:>4}  {}  {}",
            entry.stage.priority(),
            entry.stage.name().cyan(),
            format!("({})", entry.provider).dimmed()
        );
    }
}

fn print_paths(title: &str, paths: &BTreeSet<String>, paint: fn(&str) -> colored::ColoredString) {
    if paths.is_empty() {
        return;
    }
    println!();
    println!("{}", format!("{} ({}):", title, paths.len()).bold());
    for path in paths {
        println!("  {}", paint(path));
    }
}

pub fn print_diff(diff: &RenderDiff) {
    if diff.is_clean() && diff.untracked.is_empty() {
        println!("{}", "✓ Rendered files are up to date".green());
        return;
    }
    print_paths("New files", &diff.new, |p| p.green());
    print_paths("Updated files", &diff.updated, |p| p.yellow());
    print_paths("Deleted files", &diff.deleted, |p| p.red());
    print_paths("Untracked files", &diff.untracked, |p| p.dimmed());
}

/// Prints the render diff, then writes it to disk unless `dry_run`.
pub fn render(stages: &[Box<dyn Stage>], output: &Path, dry_run: bool) -> anyhow::Result<()> {
    let plan = nebari_core::plan_stages(stages, output)?;
    print_diff(plan.diff());

    if dry_run {
        println!();
        println!("{}", "Dry run, nothing was written".yellow());
        return Ok(());
    }
    if plan.diff().is_clean() {
        return Ok(());
    }

    let diff = plan.apply()?;
    println!();
    println!(
        "{}",
        format!(
            "✓ Wrote {} files, removed {} paths",
            diff.new.len() + diff.updated.len(),
            diff.deleted.len()
        )
        .green()
    );
    Ok(())
}

pub fn print_summary(summary: &DeploySummary) {
    if summary.is_empty() {
        return;
    }
    println!();
    println!("{}", "Deployment summary".bold());

    if !summary.service_urls.is_empty() {
        println!("  Services:");
        for (name, url) in &summary.service_urls {
            println!("    {:<20} {}", name, url.cyan());
        }
    }
    if let Some(kubeconfig) = &summary.kubeconfig {
        println!("  Kubernetes kubeconfig located at file://{}", kubeconfig);
    }
    if let Some(root) = &summary.keycloak_root {
        println!(
            "  Keycloak master realm: username={} password={} url={}",
            root.username, root.password, root.url
        );
        if root.generated {
            println!(
                "  {}",
                "This root password was generated; store it or set security.keycloak.initial_root_password"
                    .yellow()
            );
        }
    }
}
