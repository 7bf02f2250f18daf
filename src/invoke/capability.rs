//! Named capabilities granted to a single external-tool invocation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::InvokeError;

/// An external action the Claude CLI can be permitted to perform.
///
/// Serialized with the exact names the CLI expects in `--allowedTools`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    Task,
    Bash,
    Edit,
    Write,
    Read,
    WebFetch,
    WebSearch,
    Batch,
    Glob,
    Grep,
    #[serde(rename = "LS")]
    Ls,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::Task,
        Capability::Bash,
        Capability::Edit,
        Capability::Write,
        Capability::Read,
        Capability::WebFetch,
        Capability::WebSearch,
        Capability::Batch,
        Capability::Glob,
        Capability::Grep,
        Capability::Ls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Task => "Task",
            Capability::Bash => "Bash",
            Capability::Edit => "Edit",
            Capability::Write => "Write",
            Capability::Read => "Read",
            Capability::WebFetch => "WebFetch",
            Capability::WebSearch => "WebSearch",
            Capability::Batch => "Batch",
            Capability::Glob => "Glob",
            Capability::Grep => "Grep",
            Capability::Ls => "LS",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = InvokeError;

    /// Case-insensitive, so workflow files may say `read` or `READ`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| InvokeError::UnknownCapability(name.to_string()))
    }
}

/// A set of capabilities with a canonical iteration order.
///
/// Insertion order never leaks out: two sets holding the same capabilities
/// compare, serialize and fingerprint identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse capability names, rejecting the first unknown one.
    pub fn parse<I, S>(names: I) -> Result<Self, InvokeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<Capability>())
            .collect()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Canonical CLI names, in canonical order.
    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(Capability::as_str).collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        f.write_str(&self.names().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_from_str_case_insensitive() {
        assert_eq!("read".parse::<Capability>().unwrap(), Capability::Read);
        assert_eq!("WEBFETCH".parse::<Capability>().unwrap(), Capability::WebFetch);
        assert_eq!("ls".parse::<Capability>().unwrap(), Capability::Ls);
        assert_eq!(" Grep ".parse::<Capability>().unwrap(), Capability::Grep);
    }

    #[test]
    fn test_capability_unknown_is_rejected() {
        let err = "Teleport".parse::<Capability>().unwrap_err();
        assert!(matches!(err, InvokeError::UnknownCapability(ref name) if name == "Teleport"));
    }

    #[test]
    fn test_capability_display_uses_cli_names() {
        assert_eq!(Capability::Ls.to_string(), "LS");
        assert_eq!(Capability::WebSearch.to_string(), "WebSearch");
    }

    #[test]
    fn test_capability_serde_uses_cli_names() {
        let json = serde_json::to_string(&Capability::Ls).unwrap();
        assert_eq!(json, "\"LS\"");
        let back: Capability = serde_json::from_str("\"WebFetch\"").unwrap();
        assert_eq!(back, Capability::WebFetch);
    }

    #[test]
    fn test_set_order_is_canonical() {
        let a = CapabilitySet::parse(["Grep", "Read", "Bash"]).unwrap();
        let b = CapabilitySet::parse(["Bash", "Grep", "Read"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.names(), b.names());
        assert_eq!(a.to_string(), "Bash,Read,Grep");
    }

    #[test]
    fn test_set_parse_rejects_unknown() {
        let result = CapabilitySet::parse(["Read", "Fly"]);
        assert!(matches!(result, Err(InvokeError::UnknownCapability(ref n)) if n == "Fly"));
    }

    #[test]
    fn test_set_deduplicates() {
        let set = CapabilitySet::parse(["Read", "read", "READ"]).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(Capability::Read));
    }

    #[test]
    fn test_empty_set_display() {
        assert_eq!(CapabilitySet::new().to_string(), "(none)");
        assert!(CapabilitySet::new().is_empty());
    }
}
