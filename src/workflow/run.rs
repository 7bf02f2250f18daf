//! Workflow run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::invoke::Invocation;
use crate::template::Parameters;

/// One execution attempt of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAttempt {
    /// 1-based position of the step in its workflow.
    pub step: usize,
    pub name: String,
    /// 1-based attempt number within the step.
    pub attempt: u32,
    /// True when copied from an earlier run during resume.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
    pub invocation: Invocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunStatus {
    Running,
    Succeeded,
    FailedAtStep {
        step: usize,
        name: String,
        kind: String,
        diagnostic: String,
    },
    Aborted {
        step: usize,
        name: String,
        kind: String,
        reason: String,
    },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::FailedAtStep { step, name, kind, .. } => {
                write!(f, "failed-at-step {} ({}): {}", step, name, kind)
            }
            RunStatus::Aborted { step, name, kind, .. } => {
                write!(f, "aborted at step {} ({}): {}", step, name, kind)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow: String,
    pub parameters: Parameters,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<Uuid>,
    /// Every attempt, in execution order.
    pub attempts: Vec<StepAttempt>,
    pub status: RunStatus,
}

impl WorkflowRun {
    pub fn start(workflow: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow: workflow.into(),
            parameters,
            started_at: Utc::now(),
            ended_at: None,
            resumed_from: None,
            attempts: Vec::new(),
            status: RunStatus::Running,
        }
    }

    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    pub fn record(&mut self, attempt: StepAttempt) {
        self.attempts.push(attempt);
    }

    /// Set the terminal status. Returns false, leaving the run untouched,
    /// when it was already sealed.
    pub fn seal(&mut self, status: RunStatus) -> bool {
        if self.is_sealed() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        true
    }

    pub fn is_sealed(&self) -> bool {
        self.status.is_terminal()
    }

    /// The step a resume should restart at, if this run stopped early.
    pub fn resume_point(&self) -> Option<usize> {
        match self.status {
            RunStatus::FailedAtStep { step, .. } | RunStatus::Aborted { step, .. } => Some(step),
            _ => None,
        }
    }

    /// The final attempt made for step `step`.
    pub fn last_attempt(&self, step: usize) -> Option<&StepAttempt> {
        self.attempts.iter().rev().find(|a| a.step == step)
    }

    /// Attempts that actually spawned a process.
    pub fn spawn_count(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| !a.invocation.cached && !a.replayed)
            .count()
    }

    /// `(name, output)` of each step's final successful attempt, in step order.
    pub fn step_outputs(&self) -> Vec<(&str, &str)> {
        let mut steps: Vec<usize> = self.attempts.iter().map(|a| a.step).collect();
        steps.dedup();
        steps
            .into_iter()
            .filter_map(|step| self.last_attempt(step))
            .filter(|a| a.invocation.succeeded())
            .map(|a| (a.name.as_str(), a.invocation.output()))
            .collect()
    }

    /// Step outputs concatenated under `## <name>` headers.
    pub fn output(&self) -> String {
        self.step_outputs()
            .into_iter()
            .map(|(name, output)| format!("## {}\n{}", name, output.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn failed_step(&self) -> Option<usize> {
        match self.status {
            RunStatus::FailedAtStep { step, .. } => Some(step),
            _ => None,
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at
            .map(|end| end.signed_duration_since(self.started_at))
    }
}
