//! Run history: `conductor history`.

use anyhow::Result;
use console::style;
use std::path::Path;

use super::super::HistoryCommands;
use conductor::config::Config;
use conductor::ui::print_run_report;
use conductor::workflow::{RunStatus, RunStore};

pub fn cmd_history(
    project_dir: &Path,
    command: Option<HistoryCommands>,
    limit: usize,
) -> Result<()> {
    let config = Config::load(project_dir)?;
    let store = RunStore::new(&config.runs_dir());

    match command {
        None => {
            let runs = store.list()?;
            if runs.is_empty() {
                println!("No runs recorded in {}", store.dir().display());
                return Ok(());
            }
            for summary in runs.iter().take(limit) {
                let status = match &summary.status {
                    RunStatus::Succeeded => style(summary.status.to_string()).green(),
                    RunStatus::Running => style(summary.status.to_string()).dim(),
                    _ => style(summary.status.to_string()).red(),
                };
                println!(
                    "{}  {}  {:<24} {:>3} attempts  {}",
                    style(&summary.id.to_string()[..8]).cyan(),
                    summary.started_at.format("%Y-%m-%d %H:%M:%S"),
                    summary.workflow,
                    summary.attempts,
                    status
                );
            }
            if runs.len() > limit {
                println!("... {} older run(s) not shown", runs.len() - limit);
            }
        }
        Some(HistoryCommands::Show { id, json }) => {
            let run = store.load(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_run_report(&run);
                let output = run.output();
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
        }
    }

    Ok(())
}
