//! Deterministic cache keys for invocations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::invoke::{CapabilitySet, ReasoningLevel};

/// Hex-encoded SHA256 digest of an invocation's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

/// Canonical form that gets hashed. Fields are declared in sorted key order
/// so the serialized JSON is key-sorted regardless of serde_json features.
#[derive(Serialize)]
struct Canonical<'a> {
    capabilities: Vec<&'static str>,
    prompt: &'a str,
    reasoning: &'static str,
}

impl Fingerprint {
    pub fn compute(prompt: &str, capabilities: &CapabilitySet, reasoning: ReasoningLevel) -> Self {
        let canonical = Canonical {
            capabilities: capabilities.names(),
            prompt,
            reasoning: reasoning.as_str(),
        };
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_string(&canonical).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Accept an externally supplied digest (e.g. a cache file name).
    pub fn from_hex(value: &str) -> Option<Self> {
        let valid = value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(names: &[&str]) -> CapabilitySet {
        CapabilitySet::parse(names).unwrap()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Fingerprint::compute("analyze X", &caps(&["Read"]), ReasoningLevel::Light);
        let b = Fingerprint::compute("analyze X", &caps(&["Read"]), ReasoningLevel::Light);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_capability_order() {
        let orders: [&[&str]; 3] = [
            &["Read", "Grep", "Bash"],
            &["Bash", "Read", "Grep"],
            &["Grep", "Bash", "Read"],
        ];
        let prints: Vec<Fingerprint> = orders
            .iter()
            .map(|names| Fingerprint::compute("p", &caps(names), ReasoningLevel::Heavy))
            .collect();
        assert!(prints.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_fingerprint_changes_with_each_input() {
        let base = Fingerprint::compute("p", &caps(&["Read"]), ReasoningLevel::Light);
        assert_ne!(
            base,
            Fingerprint::compute("q", &caps(&["Read"]), ReasoningLevel::Light)
        );
        assert_ne!(
            base,
            Fingerprint::compute("p", &caps(&["Read", "Grep"]), ReasoningLevel::Light)
        );
        assert_ne!(
            base,
            Fingerprint::compute("p", &caps(&["Read"]), ReasoningLevel::Moderate)
        );
    }

    #[test]
    fn test_from_hex_validates() {
        let fp = Fingerprint::compute("p", &CapabilitySet::new(), ReasoningLevel::None);
        assert_eq!(Fingerprint::from_hex(fp.as_str()), Some(fp.clone()));
        assert_eq!(Fingerprint::from_hex("../etc/passwd"), None);
        assert_eq!(Fingerprint::from_hex("abc"), None);
    }

    #[test]
    fn test_short_is_prefix() {
        let fp = Fingerprint::compute("p", &CapabilitySet::new(), ReasoningLevel::None);
        assert!(fp.as_str().starts_with(fp.short()));
        assert_eq!(fp.short().len(), 12);
    }
}
