//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                |
//! |------------|---------------------------------|
//! | `run`      | `Run`, `Resume`                 |
//! | `invoke`   | `Invoke`                        |
//! | `workflow` | `Validate`                      |
//! | `history`  | `History`                       |
//! | `cache`    | `Cache`                         |
//! | `config`   | `Config`                        |

pub mod cache;
pub mod config;
pub mod history;
pub mod invoke;
pub mod run;
pub mod workflow;

pub use cache::cmd_cache;
pub use config::cmd_config;
pub use history::cmd_history;
pub use invoke::cmd_invoke;
pub use run::{cmd_resume, cmd_run};
pub use workflow::cmd_validate;

use anyhow::Result;
use std::path::Path;

use super::Cli;
use conductor::config::Config;

/// Load configuration and apply the global CLI overrides.
pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<Config> {
    let mut config = Config::load(project_dir)?;
    if let Some(cmd) = &cli.claude_cmd {
        config.set_claude_cmd(cmd.clone());
    }
    if cli.no_cache {
        config.disable_cache();
    }
    Ok(config)
}
