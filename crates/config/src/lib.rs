//! Configuration loading, validation, and management for HybridMem.
//!
//! Loads configuration from `~/.hybridmem/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.hybridmem/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Per-session log limits and expiry
    #[serde(default)]
    pub session: SessionConfig,

    /// Context assembly budget and section toggles
    #[serde(default)]
    pub context: ContextConfig,

    /// Semantic-recall defaults
    #[serde(default)]
    pub semantic: SemanticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Oldest messages are evicted once a log exceeds this length.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Inactivity window in milliseconds before a session may be swept.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Create unknown sessions on first message append instead of failing.
    #[serde(default)]
    pub auto_create: bool,
}

fn default_max_messages() -> usize {
    100
}
fn default_ttl_ms() -> u64 {
    3_600_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            ttl_ms: default_ttl_ms(),
            auto_create: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum estimated tokens in an assembled context.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// How many recent turns are offered to the assembler.
    #[serde(default = "default_max_recent_messages")]
    pub max_recent_messages: usize,

    /// How many semantic memories are recalled per build.
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    #[serde(default = "default_true")]
    pub enable_persona: bool,

    #[serde(default = "default_true")]
    pub enable_semantic_recall: bool,
}

fn default_token_budget() -> usize {
    4096
}
fn default_max_recent_messages() -> usize {
    10
}
fn default_recall_limit() -> usize {
    5
}
fn default_true() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            max_recent_messages: default_max_recent_messages(),
            recall_limit: default_recall_limit(),
            enable_persona: true,
            enable_semantic_recall: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Importance stamped on memories added without one, in `[0, 1]`.
    #[serde(default = "default_importance")]
    pub default_importance: f64,
}

fn default_importance() -> f64 {
    0.5
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            default_importance: default_importance(),
        }
    }
}

impl MemoryConfig {
    /// Load configuration from the default path (~/.hybridmem/config.toml).
    ///
    /// Environment variables override file values:
    /// - `HYBRIDMEM_TOKEN_BUDGET`
    /// - `HYBRIDMEM_MAX_MESSAGES`
    /// - `HYBRIDMEM_SESSION_TTL_MS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`load`](Self::load)).
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(budget) = parse_override(&lookup, "HYBRIDMEM_TOKEN_BUDGET")? {
            self.context.token_budget = budget;
        }
        if let Some(max) = parse_override(&lookup, "HYBRIDMEM_MAX_MESSAGES")? {
            self.session.max_messages = max;
        }
        if let Some(ttl) = parse_override(&lookup, "HYBRIDMEM_SESSION_TTL_MS")? {
            self.session.ttl_ms = ttl;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hybridmem")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_messages == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_messages must be > 0".into(),
            ));
        }

        if self.context.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "context.token_budget must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.semantic.default_importance) {
            return Err(ConfigError::ValidationError(
                "semantic.default_importance must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidOverride { key, value: raw }),
        None => Ok(None),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid value {value:?} for {key}")]
    InvalidOverride { key: &'static str, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
