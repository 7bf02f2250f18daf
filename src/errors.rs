//! Typed error hierarchy for conductor.
//!
//! Four enums cover the four subsystems:
//! - `InvokeError`: failures that stop an invocation before or while spawning
//! - `CacheError`: cache backend failures
//! - `TemplateError`: prompt template parse and render failures
//! - `WorkflowError`: workflow definition and sequencing failures
//!
//! Failures *reported by* the external tool (non-zero exit, timeout) are not
//! errors at this level: they are recorded on the `Invocation` itself.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent the invoker from producing an `Invocation`.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("Prompt text is empty")]
    EmptyPrompt,

    #[error("I/O error while running '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl InvokeError {
    /// Stable, user-facing name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::SpawnFailed { .. } => "invocation-spawn-failure",
            InvokeError::UnknownCapability(_) => "unknown-capability",
            InvokeError::EmptyPrompt => "empty-prompt",
            InvokeError::Io { .. } => "invocation-io",
        }
    }
}

/// Errors from a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache entry {fingerprint} is corrupt: {source}")]
    Corrupt {
        fingerprint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl CacheError {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Corrupt { .. } => "cache-corrupt",
            CacheError::Io { .. } => "cache-io",
            CacheError::Serialize(_) => "cache-serialize",
        }
    }
}

/// Errors from parsing or rendering a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Unclosed slot starting at byte {offset}")]
    UnclosedSlot { offset: usize },

    #[error("Empty slot at byte {offset}")]
    EmptySlot { offset: usize },

    #[error("Invalid slot name '{name}'")]
    InvalidSlotName { name: String },

    #[error("Missing value for parameter '{name}'")]
    MissingParameter { name: String },
}

/// Errors from loading, validating or sequencing a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Failed to read workflow file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse workflow file at {path}: {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Unsupported workflow file format: {path} (expected .json, .yaml, .yml or .toml)")]
    UnsupportedFormat { path: PathBuf },

    #[error("Workflow '{0}' has no steps")]
    NoSteps(String),

    #[error("Step {index} has an empty name")]
    UnnamedStep { index: usize },

    #[error("Duplicate step name '{0}'")]
    DuplicateStep(String),

    #[error("Step '{step}' has an invalid template: {source}")]
    Template {
        step: String,
        #[source]
        source: TemplateError,
    },

    #[error("Step '{step}' cannot be rendered: {source}")]
    Parameters {
        step: String,
        #[source]
        source: TemplateError,
    },

    #[error("Step '{step}' is misconfigured: {source}")]
    Capability {
        step: String,
        #[source]
        source: InvokeError,
    },

    #[error("Step '{step}' has an invalid reasoning level '{value}'")]
    InvalidReasoning { step: String, value: String },

    #[error("Step '{step}' must allow at least one attempt")]
    ZeroAttempts { step: String },

    #[error("Step '{step}' has a zero timeout; omit timeout_secs to use the configured limit")]
    ZeroTimeout { step: String },

    #[error("Run {run_id} cannot be resumed: {reason}")]
    NotResumable { run_id: String, reason: String },
}
