//! Configuration for conductor.
//!
//! Settings are layered: `.conductor/conductor.toml`, then environment
//! (`CLAUDE_CMD`, `SKIP_PERMISSIONS`), then CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [claude]
//! cmd = "claude"
//! skip_permissions = false
//! timeout_secs = 900
//! prefix_args = []
//! extra_args = []
//!
//! [cache]
//! enabled = true
//! ttl_secs = 3600
//! backend = "file"
//! dir = ".conductor/cache"
//!
//! [context]
//! size_budget = 24000
//! estimator = "chars"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{DEFAULT_TTL_SECS, FileCache, MemoryCache, NoCache, ResultCache};
use crate::context::{DEFAULT_CONTEXT_BUDGET, EstimatorKind};
use crate::invoke::InvokerSettings;
use crate::invoke::process::DEFAULT_TIMEOUT_SECS;
use crate::workflow::SequencerSettings;

pub const STATE_DIR: &str = ".conductor";
pub const CONFIG_FILE: &str = "conductor.toml";

/// Where cached outputs live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    File,
    Memory,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::File => write!(f, "file"),
            CacheBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(CacheBackend::File),
            "memory" => Ok(CacheBackend::Memory),
            _ => anyhow::bail!("Invalid cache backend '{}'. Valid values: file, memory", s),
        }
    }
}

/// Claude CLI integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeSection {
    /// Claude CLI command (default: "claude")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default)]
    pub skip_permissions: bool,
    /// Wall-clock limit per invocation; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Arguments placed before the generated flags
    #[serde(default)]
    pub prefix_args: Vec<String>,
    /// Arguments placed after the generated flags
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ClaudeSection {
    fn default() -> Self {
        Self {
            cmd: None,
            skip_permissions: false,
            timeout_secs: default_timeout_secs(),
            prefix_args: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub backend: CacheBackend,
    /// Cache directory for the file backend, relative to the project dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_ttl_secs(),
            backend: CacheBackend::default(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    #[serde(default = "default_size_budget")]
    pub size_budget: usize,
    #[serde(default)]
    pub estimator: EstimatorKind,
}

fn default_size_budget() -> usize {
    DEFAULT_CONTEXT_BUDGET
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            size_budget: default_size_budget(),
            estimator: EstimatorKind::default(),
        }
    }
}

/// Contents of `conductor.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorToml {
    #[serde(default)]
    pub claude: ClaudeSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub context: ContextSection,
}

impl ConductorToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conductor.toml")
    }

    /// Load `conductor.toml` from `state_dir`, or defaults when it is absent.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize conductor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cmd) = lookup("CLAUDE_CMD").filter(|c| !c.trim().is_empty()) {
            self.claude.cmd = Some(cmd);
        }
        if let Some(value) = lookup("SKIP_PERMISSIONS") {
            self.claude.skip_permissions = value != "false";
        }
    }

    /// The Claude command, falling back to "claude".
    pub fn claude_cmd(&self) -> String {
        self.claude
            .cmd
            .clone()
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.claude.cmd.as_deref().is_some_and(|c| c.trim().is_empty()) {
            warnings.push("claude.cmd is empty; \"claude\" will be used".to_string());
        }
        if self.claude.timeout_secs == 0 {
            warnings.push("claude.timeout_secs is 0: invocations have no time limit".to_string());
        }
        for flag in ["-p", "--print", "--allowedTools"] {
            if self
                .claude
                .extra_args
                .iter()
                .chain(&self.claude.prefix_args)
                .any(|a| a == flag)
            {
                warnings.push(format!(
                    "'{}' is generated per invocation and should not appear in claude args",
                    flag
                ));
            }
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            warnings.push("cache.ttl_secs is 0: cached entries expire immediately".to_string());
        }
        if self.cache.backend == CacheBackend::Memory {
            warnings.push(
                "cache.backend = \"memory\" only helps within a single conductor process"
                    .to_string(),
            );
        }
        if self.context.size_budget == 0 {
            warnings.push("context.size_budget is 0: no prior output reaches later steps".to_string());
        }

        warnings
    }
}

/// Runtime configuration: the parsed file plus resolved paths and CLI
/// overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
    pub toml: ConductorToml,
}

impl Config {
    /// Load from `project_dir` with environment overrides applied.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut config = Self::load_without_env(project_dir)?;
        config.toml.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_without_env(project_dir: &Path) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let state_dir = project_dir.join(STATE_DIR);
        let toml = ConductorToml::load_or_default(&state_dir)?;
        Ok(Self {
            project_dir,
            state_dir,
            toml,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.state_dir.join("runs")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.state_dir.join("workflows")
    }

    pub fn cache_dir(&self) -> PathBuf {
        match &self.toml.cache.dir {
            Some(dir) => self.project_dir.join(dir),
            None => self.state_dir.join("cache"),
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.runs_dir()).context("Failed to create runs directory")?;
        std::fs::create_dir_all(self.log_dir()).context("Failed to create log directory")?;
        if self.toml.cache.enabled && self.toml.cache.backend == CacheBackend::File {
            std::fs::create_dir_all(self.cache_dir())
                .context("Failed to create cache directory")?;
        }
        Ok(())
    }

    /// CLI override for the Claude command.
    pub fn set_claude_cmd(&mut self, cmd: impl Into<String>) {
        self.toml.claude.cmd = Some(cmd.into());
    }

    pub fn disable_cache(&mut self) {
        self.toml.cache.enabled = false;
    }

    pub fn invoker_settings(&self) -> InvokerSettings {
        let claude = &self.toml.claude;
        InvokerSettings {
            command: self.toml.claude_cmd(),
            prefix_args: claude.prefix_args.clone(),
            extra_args: claude.extra_args.clone(),
            skip_permissions: claude.skip_permissions,
            working_dir: Some(self.project_dir.clone()),
            env: Vec::new(),
            timeout: (claude.timeout_secs > 0).then(|| Duration::from_secs(claude.timeout_secs)),
        }
    }

    pub fn sequencer_settings(&self) -> SequencerSettings {
        SequencerSettings {
            cache_ttl: Duration::from_secs(self.toml.cache.ttl_secs),
            context_budget: self.toml.context.size_budget,
            estimator: self.toml.context.estimator,
            use_cache: self.toml.cache.enabled,
        }
    }

    /// The configured cache backend; `NoCache` when caching is disabled.
    pub fn build_cache(&self) -> Arc<dyn ResultCache> {
        if !self.toml.cache.enabled {
            return Arc::new(NoCache);
        }
        match self.toml.cache.backend {
            CacheBackend::File => Arc::new(FileCache::new(self.cache_dir())),
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml = ConductorToml::parse("").unwrap();
        assert_eq!(toml.claude_cmd(), "claude");
        assert!(!toml.claude.skip_permissions);
        assert_eq!(toml.claude.timeout_secs, 900);
        assert!(toml.cache.enabled);
        assert_eq!(toml.cache.ttl_secs, 3600);
        assert_eq!(toml.cache.backend, CacheBackend::File);
        assert_eq!(toml.context.size_budget, 24_000);
        assert_eq!(toml.context.estimator, EstimatorKind::Chars);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_full() {
        let content = r#"
[claude]
cmd = "my-claude"
skip_permissions = true
timeout_secs = 60
extra_args = ["--model", "opus"]

[cache]
enabled = false
ttl_secs = 10
backend = "memory"

[context]
size_budget = 500
estimator = "tokens"
"#;
        let toml = ConductorToml::parse(content).unwrap();
        assert_eq!(toml.claude_cmd(), "my-claude");
        assert!(toml.claude.skip_permissions);
        assert_eq!(toml.claude.extra_args, vec!["--model", "opus"]);
        assert!(!toml.cache.enabled);
        assert_eq!(toml.cache.backend, CacheBackend::Memory);
        assert_eq!(toml.context.estimator, EstimatorKind::Tokens);
    }

    #[test]
    fn test_parse_rejects_bad_backend() {
        assert!(ConductorToml::parse("[cache]\nbackend = \"redis\"\n").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut toml = ConductorToml::parse("[claude]\ncmd = \"file-claude\"\n").unwrap();
        toml.apply_env(env(&[]));
        assert_eq!(toml.claude_cmd(), "file-claude");

        toml.apply_env(env(&[("CLAUDE_CMD", "env-claude"), ("SKIP_PERMISSIONS", "1")]));
        assert_eq!(toml.claude_cmd(), "env-claude");
        assert!(toml.claude.skip_permissions);

        toml.apply_env(env(&[("CLAUDE_CMD", "  "), ("SKIP_PERMISSIONS", "false")]));
        assert_eq!(toml.claude_cmd(), "env-claude");
        assert!(!toml.claude.skip_permissions);
    }

    #[test]
    fn test_validate_warnings() {
        let content = r#"
[claude]
timeout_secs = 0
extra_args = ["-p"]

[cache]
ttl_secs = 0

[context]
size_budget = 0
"#;
        let warnings = ConductorToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.contains("'-p'")));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = ConductorToml::default();
        toml.cache.ttl_secs = 42;
        toml.save(&path).unwrap();
        assert_eq!(ConductorToml::load(&path).unwrap().cache.ttl_secs, 42);
    }

    #[test]
    fn test_config_paths_and_settings() {
        let dir = tempdir().unwrap();
        let state = dir.path().join(STATE_DIR);
        fs::create_dir_all(&state).unwrap();
        fs::write(
            state.join(CONFIG_FILE),
            "[claude]\ncmd = \"sh\"\nprefix_args = [\"fake.sh\"]\ntimeout_secs = 5\n\n[cache]\ndir = \"tmp-cache\"\n",
        )
        .unwrap();

        let config = Config::load_without_env(dir.path()).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.runs_dir(), root.join(".conductor/runs"));
        assert_eq!(config.log_dir(), root.join(".conductor/logs"));
        assert_eq!(config.cache_dir(), root.join("tmp-cache"));

        let invoker = config.invoker_settings();
        assert_eq!(invoker.command, "sh");
        assert_eq!(invoker.prefix_args, vec!["fake.sh"]);
        assert_eq!(invoker.timeout, Some(Duration::from_secs(5)));
        assert_eq!(invoker.working_dir, Some(root.clone()));

        let seq = config.sequencer_settings();
        assert!(seq.use_cache);
        assert_eq!(seq.cache_ttl, Duration::from_secs(3600));

        config.ensure_directories().unwrap();
        assert!(root.join(".conductor/runs").is_dir());
        assert!(root.join("tmp-cache").is_dir());
    }

    #[test]
    fn test_disabled_cache_builds_no_cache() {
        let dir = tempdir().unwrap();
        let mut config = Config::load_without_env(dir.path()).unwrap();
        config.disable_cache();
        assert!(!config.sequencer_settings().use_cache);
        let cache = config.build_cache();
        let fp = crate::cache::Fingerprint::compute(
            "p",
            &crate::invoke::CapabilitySet::new(),
            crate::invoke::ReasoningLevel::None,
        );
        cache.put(&fp, "out", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(&fp), None);
    }

    #[test]
    fn test_zero_timeout_disables_limit() {
        let dir = tempdir().unwrap();
        let mut config = Config::load_without_env(dir.path()).unwrap();
        config.toml.claude.timeout_secs = 0;
        assert_eq!(config.invoker_settings().timeout, None);
    }
}
