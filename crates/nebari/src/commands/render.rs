use crate::{GlobalArgs, ProjectArgs, utils};
use colored::Colorize;
use nebari_core::into_stages;

pub fn handle(global: &GlobalArgs, project: &ProjectArgs, dry_run: bool) -> anyhow::Result<()> {
    let config = utils::load_config(project.config.as_deref())?;
    let (_factory, resolved) = utils::resolve_stages(global, config, &project.output)?;
    let stages = into_stages(resolved);

    println!(
        "{}",
        format!("Rendering {} stages into {}", stages.len(), project.output.display()).blue()
    );
    utils::render(&stages, &project.output, dry_run)
}
