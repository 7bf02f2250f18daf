//! Workflow execution: `conductor run` and `conductor resume`.

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::super::Cli;
use super::load_config;
use super::workflow::{load_workflow, parse_params};
use conductor::config::Config;
use conductor::errors::WorkflowError;
use conductor::invoke::ProcessInvoker;
use conductor::ui::{RunProgress, print_run_report};
use conductor::workflow::{RunStore, Sequencer, WorkflowRun};

pub(super) fn build_sequencer(config: &Config, progress: Arc<RunProgress>) -> Sequencer {
    let invoker = ProcessInvoker::new(config.invoker_settings()).with_sink(progress);
    Sequencer::new(
        Arc::new(invoker),
        config.build_cache(),
        config.sequencer_settings(),
    )
}

pub async fn cmd_run(
    cli: &Cli,
    project_dir: &Path,
    workflows: &[String],
    arguments: &str,
    params: &[String],
    json: bool,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    config.ensure_directories()?;
    let params = parse_params(arguments, params)?;

    let batch = workflows
        .iter()
        .map(|arg| load_workflow(&config.project_dir, arg).map(|w| (w, params.clone())))
        .collect::<Result<Vec<_>>>()?;

    let names: Vec<&str> = batch.iter().map(|(w, _)| w.name()).collect();
    let progress = Arc::new(RunProgress::new(
        format!("Running {}", names.join(", ")),
        !cli.quiet,
    ));
    let sequencer = build_sequencer(&config, progress.clone());
    let results = sequencer.run_many(&batch).await;
    progress.finish();

    finish_runs(&config, results, json)
}

pub async fn cmd_resume(
    cli: &Cli,
    project_dir: &Path,
    workflow: &str,
    run_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    config.ensure_directories()?;
    let workflow = load_workflow(&config.project_dir, workflow)?;
    let store = RunStore::new(&config.runs_dir());

    let previous = match run_id {
        Some(id) => store.load(id)?,
        None => store
            .latest_resumable(workflow.name())?
            .with_context(|| format!("No failed run of workflow '{}' to resume", workflow.name()))?,
    };
    info!(run = %previous.short_id(), status = %previous.status, "Resuming run");

    let progress = Arc::new(RunProgress::new(
        format!("Resuming {}", workflow.name()),
        !cli.quiet,
    ));
    let sequencer = build_sequencer(&config, progress.clone());
    let result = sequencer
        .resume(&workflow, &previous.parameters, &previous)
        .await;
    progress.finish();

    finish_runs(&config, vec![result], json)
}

/// Persist, report and print each run. Fails when any run did not succeed.
fn finish_runs(
    config: &Config,
    results: Vec<Result<WorkflowRun, WorkflowError>>,
    json: bool,
) -> Result<()> {
    let store = RunStore::new(&config.runs_dir());
    let total = results.len();
    let mut runs = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(run) => {
                let path = store.save(&run)?;
                info!(path = %path.display(), "Saved run record");
                runs.push(run);
            }
            Err(e) => errors.push(e),
        }
    }

    if json {
        let value = if total == 1 && runs.len() == 1 {
            serde_json::to_string_pretty(&runs[0])
        } else {
            serde_json::to_string_pretty(&runs)
        }
        .context("Failed to serialize run")?;
        println!("{}", value);
    }

    let multiple = runs.len() > 1;
    for run in &runs {
        print_run_report(run);
        if !json && run.status.is_success() {
            if multiple {
                println!("# {}\n", run.workflow);
            }
            println!("{}", run.output());
        }
    }

    for e in &errors {
        eprintln!("Error: {}", e);
    }

    let failed = errors.len() + runs.iter().filter(|r| !r.status.is_success()).count();
    if failed > 0 {
        if total == 1 {
            match runs.first() {
                Some(run) => bail!("Workflow '{}' {}", run.workflow, run.status),
                None => bail!("Workflow could not start"),
            }
        }
        bail!("{} of {} workflow runs did not succeed", failed, total);
    }
    Ok(())
}
