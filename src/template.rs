//! Typed prompt templates.
//!
//! Syntax:
//! - `{{name}}`: a named parameter slot
//! - `{{context}}`: where the accumulated context is placed
//! - `$ARGUMENTS`: the positional argument string of the run
//!
//! Templates are parsed when a workflow is defined, so malformed slots are
//! reported before anything is spawned.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::errors::TemplateError;

pub const ARGUMENTS_MARKER: &str = "$ARGUMENTS";
pub const CONTEXT_SLOT: &str = "context";

static SLOT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(String),
    Arguments,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

/// Runtime values for a workflow run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// Substituted for `$ARGUMENTS`.
    #[serde(default)]
    pub arguments: String,
    /// Substituted for `{{name}}` slots.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut pos = 0;

        while pos < source.len() {
            let rest = &source[pos..];
            let next_slot = rest.find("{{");
            let next_args = rest.find(ARGUMENTS_MARKER);

            let (at, is_slot) = match (next_slot, next_args) {
                (None, None) => {
                    literal.push_str(rest);
                    break;
                }
                (Some(s), Some(a)) if a < s => (a, false),
                (Some(s), _) => (s, true),
                (None, Some(a)) => (a, false),
            };

            literal.push_str(&rest[..at]);
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let offset = pos + at;
            if !is_slot {
                segments.push(Segment::Arguments);
                pos = offset + ARGUMENTS_MARKER.len();
                continue;
            }

            let body_start = offset + 2;
            let close = source[body_start..]
                .find("}}")
                .ok_or(TemplateError::UnclosedSlot { offset })?;
            let name = source[body_start..body_start + close].trim();
            if name.is_empty() {
                return Err(TemplateError::EmptySlot { offset });
            }
            if !SLOT_NAME_REGEX.is_match(name) {
                return Err(TemplateError::InvalidSlotName {
                    name: name.to_string(),
                });
            }
            segments.push(if name == CONTEXT_SLOT {
                Segment::Context
            } else {
                Segment::Slot(name.to_string())
            });
            pos = body_start + close + 2;
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Named parameters this template requires, excluding `context`.
    pub fn slots(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Slot(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn uses_arguments(&self) -> bool {
        self.segments.contains(&Segment::Arguments)
    }

    pub fn has_context_slot(&self) -> bool {
        self.segments.contains(&Segment::Context)
    }

    /// Fail on the first named slot `params` does not provide.
    pub fn check(&self, params: &Parameters) -> Result<(), TemplateError> {
        match self.slots().into_iter().find(|name| params.get(name).is_none()) {
            Some(name) => Err(TemplateError::MissingParameter {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Produce the final prompt text.
    ///
    /// Without a `{{context}}` slot, non-empty context is prepended under a
    /// `## PRIOR CONTEXT` heading.
    pub fn render(&self, params: &Parameters, context: &str) -> Result<String, TemplateError> {
        self.check(params)?;

        let mut body = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => body.push_str(text),
                Segment::Slot(name) => body.push_str(params.get(name).unwrap_or_default()),
                Segment::Arguments => body.push_str(&params.arguments),
                Segment::Context => body.push_str(context),
            }
        }

        if self.has_context_slot() || context.trim().is_empty() {
            Ok(body)
        } else {
            Ok(format!("## PRIOR CONTEXT\n{}\n\n{}", context.trim_end(), body))
        }
    }
}

impl std::fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
