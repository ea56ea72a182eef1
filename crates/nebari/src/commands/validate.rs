use crate::utils;
use colored::Colorize;
use std::path::Path;

pub fn handle(config: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "Validating configuration...".blue());

    let config = match utils::load_config(config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", "✗ Invalid configuration".red().bold());
            return Err(e);
        }
    };

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("  project:   {}", config.project_name.cyan());
    println!("  namespace: {}", config.namespace);
    println!("  provider:  {}", config.provider);
    println!(
        "  domain:    {}",
        config.domain.as_deref().unwrap_or("(load balancer address)")
    );
    if !config.tf_extensions.is_empty() {
        println!("  extensions:");
        for extension in &config.tf_extensions {
            println!("    - {}", extension.name.cyan());
        }
    }
    Ok(())
}
