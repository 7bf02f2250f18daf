//! Result cache maintenance: `conductor cache`.

use anyhow::{Context, Result};
use std::path::Path;

use super::super::{CacheCommands, Cli};
use super::load_config;
use conductor::cache::{FileCache, ResultCache};
use conductor::config::CacheBackend;

pub fn cmd_cache(cli: &Cli, project_dir: &Path, command: CacheCommands) -> Result<()> {
    use dialoguer::Confirm;

    let config = load_config(cli, project_dir)?;
    if config.toml.cache.backend == CacheBackend::Memory {
        println!("The memory cache does not outlive a conductor process; nothing to do.");
        return Ok(());
    }
    // Maintenance always targets the on-disk store, even with --no-cache.
    let cache = FileCache::new(config.cache_dir());

    match command {
        CacheCommands::Clear { force } => {
            if !force {
                let confirm = Confirm::new()
                    .with_prompt(format!(
                        "Remove every cached result in {}?",
                        cache.dir().display()
                    ))
                    .default(false)
                    .interact()
                    .unwrap_or(false);

                if !confirm {
                    println!("Clear cancelled");
                    return Ok(());
                }
            }
            let removed = cache.clear().context("Failed to clear cache")?;
            println!("Removed {} cached result(s)", removed);
        }
        CacheCommands::Purge => {
            let removed = cache
                .purge_expired()
                .context("Failed to purge expired cache entries")?;
            println!("Removed {} expired result(s)", removed);
        }
    }

    Ok(())
}
