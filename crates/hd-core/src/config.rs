use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::version::Version;

/// Top-level configuration.
///
/// Looked up at `<root>/warchief/config.toml`, then `~/.horde/config.toml`;
/// defaults apply when neither exists.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HordeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub raider: RaiderConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl HordeConfig {
    /// Load the config for an encampment rooted at `root` (if any).
    pub fn load(root: Option<&Path>) -> Result<Self, ConfigError> {
        let candidates = root
            .map(Self::workspace_path)
            .into_iter()
            .chain(Self::user_path());
        for path in candidates {
            if path.is_file() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::load_from(path);
            }
        }
        let cfg = HordeConfig::default();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: HordeConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runtime.validate()?;
        self.session.validate()?;
        self.ledger.validate()?;
        if self.checkpoint.max_age_hours == 0 {
            return Err(ConfigError::Validation(
                "checkpoint.max_age_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn workspace_path(root: &Path) -> PathBuf {
        root.join("warchief").join("config.toml")
    }

    fn user_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".horde").join("config.toml"))
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

/// The AI runtime launched inside each agent session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime_command")]
    pub command: String,
    #[serde(default = "default_runtime_args")]
    pub args: Vec<String>,
    /// Pane commands that count as "the runtime is running".
    #[serde(default = "default_pane_commands")]
    pub pane_commands: Vec<String>,
    /// Exported to the session as the runtime's config directory.
    #[serde(default)]
    pub config_dir: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command: default_runtime_command(),
            args: default_runtime_args(),
            pane_commands: default_pane_commands(),
            config_dir: None,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "runtime.command must not be empty".to_string(),
            ));
        }
        if self.pane_commands.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "runtime.pane_commands must name at least one command".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_runtime_command() -> String {
    "claude".into()
}
fn default_runtime_args() -> Vec<String> {
    vec!["--dangerously-skip-permissions".into()]
}
fn default_pane_commands() -> Vec<String> {
    vec!["claude".into(), "node".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_shell_ready_timeout_ms")]
    pub shell_ready_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Status-bar theme; `auto` picks one per warband.
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell_ready_timeout_ms: default_shell_ready_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            theme: default_theme(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "session.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms > self.shell_ready_timeout_ms {
            return Err(ConfigError::Validation(
                "session.poll_interval_ms must not exceed shell_ready_timeout_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_shell_ready_timeout_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_theme() -> String {
    "auto".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaiderConfig {
    #[serde(default = "default_name_theme")]
    pub name_theme: String,
    #[serde(default = "default_stale_hours")]
    pub stale_hours: u64,
}

impl Default for RaiderConfig {
    fn default() -> Self {
        Self {
            name_theme: default_name_theme(),
            stale_hours: default_stale_hours(),
        }
    }
}

fn default_name_theme() -> String {
    "wasteland".into()
}
fn default_stale_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointConfig {
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
        }
    }
}

fn default_max_age_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_binary")]
    pub binary: String,
    /// Oldest `rl` release with custom-type support.
    #[serde(default = "default_min_version")]
    pub min_version: String,
    #[serde(default = "default_version_timeout_secs")]
    pub version_timeout_secs: u64,
    /// Upper bound on concurrent per-ledger queries.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            binary: default_ledger_binary(),
            min_version: default_min_version(),
            version_timeout_secs: default_version_timeout_secs(),
            parallelism: default_parallelism(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 {
            return Err(ConfigError::Validation(
                "ledger.parallelism must be at least 1".to_string(),
            ));
        }
        self.min_version()?;
        Ok(())
    }

    pub fn min_version(&self) -> Result<Version, ConfigError> {
        Version::parse(&self.min_version).map_err(|e| {
            ConfigError::Validation(format!("ledger.min_version {:?}: {e}", self.min_version))
        })
    }
}

fn default_ledger_binary() -> String {
    "rl".into()
}
fn default_min_version() -> String {
    "0.47.0".into()
}
fn default_version_timeout_secs() -> u64 {
    5
}
fn default_parallelism() -> usize {
    4
}
