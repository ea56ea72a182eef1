use crate::{GlobalArgs, ProjectArgs, utils};
use colored::Colorize;
use nebari_core::into_stages;

pub async fn handle(
    global: &GlobalArgs,
    project: &ProjectArgs,
    disable_render: bool,
    yes: bool,
) -> anyhow::Result<()> {
    let config = utils::load_config(project.config.as_deref())?;
    let project_name = config.project_name.clone();
    let (_factory, resolved) = utils::resolve_stages(global, config, &project.output)?;

    println!(
        "{}",
        format!(
            "⚠ This destroys every resource of project '{}', including all data.",
            project_name
        )
        .red()
        .bold()
    );
    utils::print_stages(&resolved);

    if !yes {
        println!();
        println!("Re-run with {} to destroy.", "--yes".yellow());
        return Ok(());
    }

    let stages = into_stages(resolved);
    if !disable_render {
        utils::render(&stages, &project.output, false)?;
    }

    let status = nebari_core::destroy_stages(&stages).await;

    println!();
    println!("{}", "Destroy status".bold());
    for (stage, success) in status.iter() {
        let mark = if success { "✓".green() } else { "✗".red() };
        println!("  {} {}", mark, stage);
    }

    if !status.all_succeeded() {
        anyhow::bail!(
            "destroy stopped early, remaining resources of '{}' must be removed manually",
            project_name
        );
    }
    println!("{}", "✓ Destroy complete".green().bold());
    Ok(())
}
