//! Provider settings.
//!
//! Settings come from a TOML file, then environment variables, then
//! command-line flags, each overriding the one before. clap resolves the
//! last two, so this module only has to merge its result over the file.

use anyhow::{Context, Result};
use cloudkit::{HttpSettings, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings that cannot be used to reach the API.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no API host configured: set CLOUDSYNC_HOST or `host` in {file}")]
    MissingHost { file: String },

    #[error("no API token configured: set CLOUDSYNC_TOKEN or `token` in {file}")]
    MissingToken { file: String },

    #[error("settings file not found: {0}")]
    NotFound(String),
}

impl ConfigError {
    pub fn advice(&self) -> &'static str {
        match self {
            Self::MissingHost { .. } | Self::MissingToken { .. } => {
                "Pass --host/--token, export the variables, or add them to the settings file"
            }
            Self::NotFound(_) => "Check the --config path",
        }
    }
}

/// Get the config directory path (~/.config/cloudsync)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("cloudsync"))
}

/// Get the state directory path (~/.local/state/cloudsync)
pub fn state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join("cloudsync"))
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::full(raw).map_or_else(|_| shellexpand::tilde(raw), |s| s);
    PathBuf::from(expanded.as_ref())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            backoff_factor: retry.backoff_factor,
            max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

/// Overrides for every resource kind's waits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaitSettings {
    pub poll_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub host: Option<String>,
    pub token: Option<String>,
    pub user_account: Option<String>,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    pub wait: WaitSettings,
    pub state_file: Option<String>,

    /// Where these settings were read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: None,
            token: None,
            user_account: None,
            request_timeout_secs: 30,
            retry: RetrySettings::default(),
            wait: WaitSettings::default(),
            state_file: None,
            source: None,
        }
    }
}

impl Settings {
    /// Default settings file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load settings.
    ///
    /// An explicit path must exist; the default path may be missing, in
    /// which case defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (expand_path(&path.to_string_lossy()), true),
            None => (Self::default_path()?, false),
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::NotFound(path.display().to_string()).into());
            }
            log::debug!("Settings file {} does not exist, using defaults", path.display());
            return Ok(Self {
                source: Some(path),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let mut settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        settings.source = Some(path);
        log::debug!("Loaded settings from {}", source_label(settings.source.as_deref()));
        Ok(settings)
    }

    /// Apply values already resolved from flags and environment.
    pub fn with_overrides(mut self, host: Option<String>, token: Option<String>, user: Option<String>) -> Self {
        if host.is_some() {
            self.host = host;
        }
        if token.is_some() {
            self.token = token;
        }
        if user.is_some() {
            self.user_account = user;
        }
        self
    }

    /// Connection settings for the HTTP transport.
    pub fn http_settings(&self) -> Result<HttpSettings, ConfigError> {
        let file = source_label(self.source.as_deref());
        let host = self
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingHost { file: file.clone() })?;
        let token = self
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken { file })?;

        let mut http = HttpSettings::new(host, token);
        http.user_account = self.user_account.clone();
        http.timeout = Duration::from_secs(self.request_timeout_secs);
        Ok(http)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            backoff_factor: self.retry.backoff_factor,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.wait.poll_interval_secs.map(Duration::from_secs)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait.timeout_secs.map(Duration::from_secs)
    }

    /// State file path, defaulting to ~/.local/state/cloudsync/state.toml
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(raw) => Ok(expand_path(raw)),
            None => Ok(state_dir()?.join("state.toml")),
        }
    }
}

fn source_label(path: Option<&Path>) -> String {
    path.map_or_else(|| "the settings file".to_string(), |p| p.display().to_string())
}
