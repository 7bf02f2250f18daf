//! Configuration view and validation commands: `conductor config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use conductor::config::{CONFIG_FILE, ConductorToml, Config};

    let config = Config::load(project_dir)?;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Conductor Configuration");
            println!("=======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found; using defaults.", CONFIG_FILE);
            }
            println!();

            let toml = &config.toml;
            println!("[claude]");
            println!("  cmd = \"{}\"", toml.claude_cmd());
            println!("  skip_permissions = {}", toml.claude.skip_permissions);
            println!("  timeout_secs = {}", toml.claude.timeout_secs);
            if !toml.claude.prefix_args.is_empty() {
                println!("  prefix_args = {:?}", toml.claude.prefix_args);
            }
            if !toml.claude.extra_args.is_empty() {
                println!("  extra_args = {:?}", toml.claude.extra_args);
            }
            println!();

            println!("[cache]");
            println!("  enabled = {}", toml.cache.enabled);
            println!("  ttl_secs = {}", toml.cache.ttl_secs);
            println!("  backend = \"{}\"", toml.cache.backend);
            println!("  dir = \"{}\"", config.cache_dir().display());
            println!();

            println!("[context]");
            println!("  size_budget = {}", toml.context.size_budget);
            println!("  estimator = \"{}\"", toml.context.estimator);
            println!();
            println!("Values include CLAUDE_CMD / SKIP_PERMISSIONS overrides.");
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = ConductorToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.state_dir)?;
            std::fs::create_dir_all(config.workflows_dir())?;
            ConductorToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [claude] cmd, skip_permissions, timeout_secs, extra_args");
            println!("  - [cache] enabled, ttl_secs, backend, dir");
            println!("  - [context] size_budget, estimator");
            println!();
            println!(
                "Workflow files go in {} and run by name.",
                config.workflows_dir().display()
            );
            println!();
        }
    }

    Ok(())
}
