use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AppointflowError, Result};

/// Top-level appointflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub slots: SlotsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Execution engine and middleware settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step invocations allowed per run before the call limit trips.
    #[serde(default = "default_max_step_calls")]
    pub max_step_calls: u32,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_step_calls: default_max_step_calls(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_max_step_calls() -> u32 { 50 }

/// Retry configuration for failing steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff_ms * 2^n`.
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 1 }
fn default_backoff() -> u64 { 200 }

/// Slot availability rules used by the reschedule flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsConfig {
    /// Normalized slot strings that are already booked.
    #[serde(default = "default_unavailable")]
    pub unavailable: Vec<String>,
    /// Slot offered when the requested one is taken.
    #[serde(default = "default_alternative")]
    pub alternative: String,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            unavailable: default_unavailable(),
            alternative: default_alternative(),
        }
    }
}

fn default_unavailable() -> Vec<String> {
    vec!["2pm".to_string(), "2:00pm".to_string(), "14:00".to_string()]
}
fn default_alternative() -> String { "3:00pm".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// When set, requests must carry it as a Bearer header or `?token=`.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
        }
    }
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Directory for log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// 1 = run start/finish only, 2 = also every step.
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

fn default_log_dir() -> String { "logs".to_string() }
fn default_log_level() -> u8 { 2 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| AppointflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let mut config: Self =
            toml::from_str(&expanded).map_err(|e| AppointflowError::Config(e.to_string()))?;
        // An unset ${VAR} or blank token leaves auth off.
        if let Some(token) = config.gateway.token.take() {
            if token.trim().is_empty() || token.starts_with("${") {
                warn!("gateway.token is empty or unresolved, gateway auth disabled");
            } else {
                config.gateway.token = Some(token);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, then `~/.appointflow/config.toml`,
    /// otherwise fall back to defaults.
    pub fn discover(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!(path = %path.display(), "Loading config");
            return Self::load(path);
        }
        if let Some(home) = dirs_home().map(|h| h.join(".appointflow").join("config.toml")) {
            if home.exists() {
                info!(path = %home.display(), "Loading config from home directory");
                return Self::load(&home);
            }
        }
        info!(path = %path.display(), "No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.max_step_calls == 0 {
            return Err(AppointflowError::Config(
                "engine.max_step_calls must be at least 1".into(),
            ));
        }
        if self.slots.alternative.trim().is_empty() {
            return Err(AppointflowError::Config(
                "slots.alternative must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the log directory (expand ~).
    pub fn log_dir(&self) -> PathBuf {
        let dir = &self.log.log_dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    warn!(var = %var_name, "Config references an unset environment variable");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
