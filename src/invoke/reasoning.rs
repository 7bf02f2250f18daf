//! Reasoning-budget levels and the thinking-token hint each maps to.

use serde::{Deserialize, Serialize};

/// Environment variable the Claude CLI reads its thinking budget from.
pub const THINKING_TOKENS_ENV: &str = "MAX_THINKING_TOKENS";

/// How much computation the external tool should spend before answering.
///
/// Levels are ordered: `None < Light < Moderate < Heavy < Maximum`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningLevel {
    #[default]
    None,
    Light,
    Moderate,
    Heavy,
    Maximum,
}

impl ReasoningLevel {
    pub const ALL: [ReasoningLevel; 5] = [
        ReasoningLevel::None,
        ReasoningLevel::Light,
        ReasoningLevel::Moderate,
        ReasoningLevel::Heavy,
        ReasoningLevel::Maximum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningLevel::None => "none",
            ReasoningLevel::Light => "light",
            ReasoningLevel::Moderate => "moderate",
            ReasoningLevel::Heavy => "heavy",
            ReasoningLevel::Maximum => "maximum",
        }
    }

    /// Fixed thinking-token budget for this level.
    pub fn budget_tokens(&self) -> u32 {
        match self {
            ReasoningLevel::None => 0,
            ReasoningLevel::Light => 4_000,
            ReasoningLevel::Moderate => 10_000,
            ReasoningLevel::Heavy => 20_000,
            ReasoningLevel::Maximum => 31_999,
        }
    }

    /// The hint to pass to the CLI, or `None` when no budget is requested.
    pub fn budget_hint(&self) -> Option<u32> {
        match self.budget_tokens() {
            0 => None,
            tokens => Some(tokens),
        }
    }
}

impl std::fmt::Display for ReasoningLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReasoningLevel {
    type Err = anyhow::Error;

    /// Accepts the level names plus the CLI's thinking keywords
    /// (`think`, `think hard`, `think harder`, `ultrathink`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(ReasoningLevel::None),
            "light" | "think" => Ok(ReasoningLevel::Light),
            "moderate" | "think hard" => Ok(ReasoningLevel::Moderate),
            "heavy" | "think harder" => Ok(ReasoningLevel::Heavy),
            "maximum" | "ultrathink" | "megathink" => Ok(ReasoningLevel::Maximum),
            _ => anyhow::bail!(
                "Invalid reasoning level '{}'. Valid values: none, light, moderate, heavy, maximum",
                s
            ),
        }
    }
}
