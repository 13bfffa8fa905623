use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncupError};

/// Top-level SyncUp configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub data: DataConfig,
    /// Checkpoint / resume configuration.
    #[serde(default)]
    pub checkpoint: Option<CheckpointConfig>,
    /// Run logging configuration.
    #[serde(default)]
    pub log: Option<LogConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            executor: ExecutorConfig::default(),
            model: ModelConfig::default(),
            data: DataConfig::default(),
            checkpoint: None,
            log: None,
        }
    }
}

/// Limits applied by the graph executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Ceiling for refine/evaluate cycles.
    #[serde(default = "default_iteration_ceiling")]
    pub iteration_ceiling: u32,
    /// Per-node timeout in seconds (0 = no timeout).
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    /// Invocation cap = factor × iteration_ceiling + node count.
    #[serde(default = "default_invocation_cap_factor")]
    pub invocation_cap_factor: usize,
    /// Explicit invocation cap, overrides the factor.
    #[serde(default)]
    pub max_invocations: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            iteration_ceiling: default_iteration_ceiling(),
            node_timeout_secs: default_node_timeout(),
            invocation_cap_factor: default_invocation_cap_factor(),
            max_invocations: None,
        }
    }
}

impl ExecutorConfig {
    pub fn node_timeout(&self) -> Option<Duration> {
        (self.node_timeout_secs > 0).then(|| Duration::from_secs(self.node_timeout_secs))
    }
}

fn default_iteration_ceiling() -> u32 { 5 }
fn default_node_timeout() -> u64 { 120 }
fn default_invocation_cap_factor() -> usize { 4 }
fn default_workspace() -> String { "~/.syncup".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// HTTP timeout for a single LLM request.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_request_timeout(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "mock".to_string() }
fn default_model_id() -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.0 }
fn default_request_timeout() -> u64 { 60 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Where the lookup store finds its JSON collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String { "data".to_string() }

/// Checkpoint / resume configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Enable checkpointing (default: true when section is present).
    #[serde(default = "default_checkpoint_enabled")]
    pub enabled: bool,
    /// SQLite file for checkpoints. Default: <workspace>/checkpoints.db
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_checkpoint_enabled() -> bool { true }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <workspace>/logs
    #[serde(default)]
    pub dir: Option<String>,
    /// 1 = run summary, 2 = per node, 3 = routing detail.
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            level: default_log_level(),
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 2 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SyncupError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| SyncupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.executor.iteration_ceiling == 0 {
            return Err(SyncupError::Config(
                "executor.iteration_ceiling must be at least 1".into(),
            ));
        }
        if self.executor.invocation_cap_factor == 0 && self.executor.max_invocations.is_none() {
            return Err(SyncupError::Config(
                "executor.invocation_cap_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.workspace)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.data.dir)
    }

    /// Checkpoint database path, if checkpointing is enabled.
    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        let cp = self.checkpoint.as_ref().filter(|c| c.enabled)?;
        Some(match &cp.path {
            Some(p) => self.resolve(p),
            None => self.workspace_dir().join("checkpoints.db"),
        })
    }

    /// Run log directory, if run logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let log = self.log.as_ref().filter(|l| l.enabled)?;
        Some(match &log.dir {
            Some(d) => self.resolve(d),
            None => self.workspace_dir().join("logs"),
        })
    }

    /// Absolute and `~/` paths are kept, relative ones are resolved
    /// against the current directory.
    fn resolve(&self, path: &str) -> PathBuf {
        expand_home(path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Replace `${NAME}` with the variable's value. Unset variables and an
/// unterminated `${` are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(&rest[open..open + 3 + close]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
