use crate::{GlobalArgs, utils};
use std::path::Path;

pub fn handle(global: &GlobalArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let config = utils::load_config(config)?;
    let (_factory, stages) = utils::resolve_stages(global, config, Path::new("./"))?;
    utils::print_stages(&stages);
    Ok(())
}
