//! Invocation request and result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CapabilitySet, ReasoningLevel};
use crate::cache::Fingerprint;

/// Inputs for one external-tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub prompt: String,
    pub capabilities: CapabilitySet,
    pub reasoning: ReasoningLevel,
    /// Overrides the invoker's configured wall-clock limit.
    pub timeout: Option<Duration>,
}

impl InvocationRequest {
    pub fn new(
        prompt: impl Into<String>,
        capabilities: CapabilitySet,
        reasoning: ReasoningLevel,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            capabilities,
            reasoning,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The timeout does not participate: it does not change what is asked.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.prompt, &self.capabilities, self.reasoning)
    }
}

/// Why an invocation that ran did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    NonZeroExit,
    TimedOut,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NonZeroExit => "invocation-nonzero-exit",
            FailureKind::TimedOut => "invocation-timeout",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum InvocationStatus {
    Succeeded,
    Failed { exit_code: i32 },
    TimedOut { limit_secs: f64 },
}

impl InvocationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationStatus::Succeeded)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            InvocationStatus::Succeeded => None,
            InvocationStatus::Failed { .. } => Some(FailureKind::NonZeroExit),
            InvocationStatus::TimedOut { .. } => Some(FailureKind::TimedOut),
        }
    }
}

impl std::fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationStatus::Succeeded => write!(f, "succeeded"),
            InvocationStatus::Failed { exit_code } => write!(f, "failed (exit {})", exit_code),
            InvocationStatus::TimedOut { limit_secs } => {
                write!(f, "timed out after {:.1}s", limit_secs)
            }
        }
    }
}

/// One recorded execution attempt, spawned or served from cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub prompt: String,
    pub capabilities: CapabilitySet,
    pub reasoning: ReasoningLevel,
    pub fingerprint: Fingerprint,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: InvocationStatus,
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// True when the output came from the cache and nothing was spawned.
    #[serde(default)]
    pub cached: bool,
}

impl Invocation {
    /// Record a cache hit. Timestamps are still taken; nothing runs.
    pub fn from_cache(request: &InvocationRequest, fingerprint: Fingerprint, output: String) -> Self {
        let now = Utc::now();
        Self {
            prompt: request.prompt.clone(),
            capabilities: request.capabilities.clone(),
            reasoning: request.reasoning,
            fingerprint,
            started_at: now,
            ended_at: now,
            status: InvocationStatus::Succeeded,
            stdout: output,
            stderr: String::new(),
            cached: true,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }

    pub fn output(&self) -> &str {
        &self.stdout
    }

    /// Text to show a user when this invocation failed.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.ended_at.signed_duration_since(self.started_at)
    }
}
