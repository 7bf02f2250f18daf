//! Workflow definitions and file loading.
//!
//! This module provides:
//! - `Step`: one validated, immutable invocation template
//! - `Workflow`: an ordered list of uniquely named steps
//! - `WorkflowSpec` / `StepSpec`: the on-disk (JSON, YAML or TOML) shape
//!
//! Everything that can be checked without running anything is checked when
//! a workflow is built: template syntax, capability names, reasoning levels,
//! step name uniqueness.

pub mod run;
pub mod sequencer;
pub mod store;

pub use run::{RunStatus, StepAttempt, WorkflowRun};
pub use sequencer::{Sequencer, SequencerSettings};
pub use store::{RunStore, RunSummary};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::context::Priority;
use crate::errors::WorkflowError;
use crate::invoke::{CapabilitySet, ReasoningLevel};
use crate::template::{Parameters, PromptTemplate};

/// One step as written in a workflow file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub prompt: String,
    /// Capability names; `tools` and `allowed_capabilities` are accepted too.
    #[serde(default, alias = "tools", alias = "allowed_capabilities")]
    pub capabilities: Vec<String>,
    #[serde(default, alias = "think_level", alias = "reasoning_level")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub context_priority: Priority,
}

fn default_max_attempts() -> u32 {
    1
}

/// A workflow as written in a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepSpec>,
}

/// A validated step. Immutable once built.
#[derive(Debug, Clone)]
pub struct Step {
    name: String,
    template: PromptTemplate,
    capabilities: CapabilitySet,
    reasoning: ReasoningLevel,
    continue_on_failure: bool,
    max_attempts: u32,
    timeout: Option<Duration>,
    context_priority: Priority,
}

impl Step {
    pub fn new(name: impl Into<String>, prompt: &str) -> Result<Self, WorkflowError> {
        let name = name.into();
        let template = PromptTemplate::parse(prompt).map_err(|source| WorkflowError::Template {
            step: name.clone(),
            source,
        })?;
        Ok(Self {
            name,
            template,
            capabilities: CapabilitySet::new(),
            reasoning: ReasoningLevel::None,
            continue_on_failure: false,
            max_attempts: 1,
            timeout: None,
            context_priority: Priority::Normal,
        })
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningLevel) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn continue_on_failure(mut self, enabled: bool) -> Self {
        self.continue_on_failure = enabled;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_context_priority(mut self, priority: Priority) -> Self {
        self.context_priority = priority;
        self
    }

    pub fn from_spec(spec: StepSpec) -> Result<Self, WorkflowError> {
        let capabilities = CapabilitySet::parse(&spec.capabilities).map_err(|source| {
            WorkflowError::Capability {
                step: spec.name.clone(),
                source,
            }
        })?;
        let reasoning = match spec.reasoning.as_deref() {
            None => ReasoningLevel::None,
            Some(value) => value
                .parse()
                .map_err(|_| WorkflowError::InvalidReasoning {
                    step: spec.name.clone(),
                    value: value.to_string(),
                })?,
        };

        let mut step = Step::new(spec.name, &spec.prompt)?
            .with_capabilities(capabilities)
            .with_reasoning(reasoning)
            .continue_on_failure(spec.continue_on_failure)
            .with_max_attempts(spec.max_attempts)
            .with_context_priority(spec.context_priority);
        if let Some(secs) = spec.timeout_secs {
            step = step.with_timeout(Duration::from_secs(secs));
        }
        Ok(step)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn reasoning(&self) -> ReasoningLevel {
        self.reasoning
    }

    pub fn continues_on_failure(&self) -> bool {
        self.continue_on_failure
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn context_priority(&self) -> Priority {
        self.context_priority
    }
}

/// Supported workflow file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Yaml,
    Toml,
}

impl DefinitionFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "json" => Some(DefinitionFormat::Json),
            "yaml" | "yml" => Some(DefinitionFormat::Yaml),
            "toml" => Some(DefinitionFormat::Toml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    description: String,
    steps: Vec<Step>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Result<Self, WorkflowError> {
        let name = name.into();
        if steps.is_empty() {
            return Err(WorkflowError::NoSteps(name));
        }
        let mut seen = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            if step.name().trim().is_empty() {
                return Err(WorkflowError::UnnamedStep { index: index + 1 });
            }
            if !seen.insert(step.name()) {
                return Err(WorkflowError::DuplicateStep(step.name().to_string()));
            }
            if step.max_attempts() == 0 {
                return Err(WorkflowError::ZeroAttempts {
                    step: step.name().to_string(),
                });
            }
            if step.timeout() == Some(Duration::ZERO) {
                return Err(WorkflowError::ZeroTimeout {
                    step: step.name().to_string(),
                });
            }
        }
        Ok(Self {
            name,
            description: String::new(),
            steps,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn from_spec(spec: WorkflowSpec) -> Result<Self, WorkflowError> {
        let steps = spec
            .steps
            .into_iter()
            .map(Step::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Workflow::new(spec.name, steps)?.with_description(spec.description))
    }

    /// Load and validate a workflow file.
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let format =
            DefinitionFormat::from_path(path).ok_or_else(|| WorkflowError::UnsupportedFormat {
                path: path.to_path_buf(),
            })?;
        let content = std::fs::read_to_string(path).map_err(|source| WorkflowError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = Self::parse_spec(&content, format).map_err(|message| {
            WorkflowError::ParseFailed {
                path: path.to_path_buf(),
                message,
            }
        })?;
        Self::from_spec(spec)
    }

    fn parse_spec(content: &str, format: DefinitionFormat) -> Result<WorkflowSpec, String> {
        match format {
            DefinitionFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            DefinitionFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            DefinitionFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Every named parameter any step needs.
    pub fn required_parameters(&self) -> BTreeSet<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.template().slots())
            .collect()
    }

    /// Check that `params` satisfies every step before anything runs.
    pub fn check_parameters(&self, params: &Parameters) -> Result<(), WorkflowError> {
        for step in &self.steps {
            step.template()
                .check(params)
                .map_err(|source| WorkflowError::Parameters {
                    step: step.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}
