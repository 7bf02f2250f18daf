//! Run history on disk: one pretty-printed JSON file per sealed run.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use super::run::{RunStatus, WorkflowRun};

/// Listing row for `conductor history`.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub id: Uuid,
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub attempts: usize,
    pub resumed_from: Option<Uuid>,
    pub path: PathBuf,
}

pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, run: &WorkflowRun) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create runs directory {}", self.dir.display()))?;
        let filename = format!(
            "{}_{}.json",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            run.short_id()
        );
        let path = self.dir.join(filename);
        let json = serde_json::to_string_pretty(run).context("Failed to serialize workflow run")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write run file {}", path.display()))?;
        Ok(path)
    }

    fn read(path: &Path) -> Result<WorkflowRun> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run file {}", path.display()))
    }

    fn run_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        files.sort();
        files.reverse(); // Most recent first
        Ok(files)
    }

    /// Summaries of every readable run, newest first. Unreadable files are
    /// skipped with a warning.
    pub fn list(&self) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::new();
        for path in self.run_files()? {
            match Self::read(&path) {
                Ok(run) => summaries.push(RunSummary {
                    id: run.id,
                    workflow: run.workflow,
                    started_at: run.started_at,
                    status: run.status,
                    attempts: run.attempts.len(),
                    resumed_from: run.resumed_from,
                    path,
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable run file"),
            }
        }
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }

    /// Load the run whose id starts with `prefix`.
    pub fn load(&self, prefix: &str) -> Result<WorkflowRun> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            bail!("Run id must not be empty");
        }
        let matches: Vec<RunSummary> = self
            .list()?
            .into_iter()
            .filter(|s| s.id.to_string().starts_with(&prefix))
            .collect();
        match matches.as_slice() {
            [] => bail!("No run found with id starting with '{}'", prefix),
            [only] => Self::read(&only.path),
            many => bail!(
                "Run id '{}' is ambiguous: matches {} runs",
                prefix,
                many.len()
            ),
        }
    }

    /// The newest run of `workflow` that ended in failure and has not
    /// been resumed by a later run.
    pub fn latest_resumable(&self, workflow: &str) -> Result<Option<WorkflowRun>> {
        let runs = self.list()?;
        let resumed: HashSet<Uuid> = runs.iter().filter_map(|s| s.resumed_from).collect();
        let candidate = runs.iter().find(|s| {
            s.workflow == workflow
                && s.status.is_terminal()
                && !s.status.is_success()
                && !resumed.contains(&s.id)
        });
        match candidate {
            Some(summary) => Self::read(&summary.path).map(Some),
            None => Ok(None),
        }
    }
}
