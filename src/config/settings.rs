//! TOML-based configuration for crmql.
//!
//! Supports a config file (crmql.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [executor]
//! concurrency = 10
//! max_records = 10000
//! timeout_seconds = 300
//!
//! [rate_limit]
//! requests_per_second = 5.0
//! burst = 10
//!
//! [output]
//! format = "markdown"
//! max_bytes = 50000
//!
//! [source]
//! fixture = "${CRMQL_DATA}/crm.json"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::{
    ExecutorConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_RECORDS, DEFAULT_TIMEOUT_SECONDS,
};
use crate::output::OutputFormat;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub executor: ExecutorSettings,
    pub rate_limit: RateLimitSettings,
    pub output: OutputSettings,
    pub source: SourceSettings,
}

/// Concurrency and safety limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Simultaneous remote calls per query.
    pub concurrency: usize,
    /// Records one query may fetch before failing.
    pub max_records: usize,
    /// Wall-clock budget per query.
    pub timeout_seconds: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_records: DEFAULT_MAX_RECORDS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// Client-side call rate. Disabled when `requests_per_second` is unset.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_second: Option<f64>,
    pub burst: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            burst: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSettings {
    pub format: OutputFormat,
    /// Byte budget for rendered output. Unbounded when unset.
    pub max_bytes: Option<usize>,
}

/// Where records come from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    /// JSON fixture file served by the fixture client.
    pub fixture: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. `$CRMQL_CONFIG`
    /// 2. `./crmql.toml`
    /// 3. `~/.config/crmql/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("CRMQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("crmql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("crmql").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.executor.concurrency == 0 {
            return Err(SettingsError::InvalidConfig(
                "executor.concurrency must be at least 1".into(),
            ));
        }
        if let Some(rate) = self.rate_limit.requests_per_second {
            if rate.is_nan() || rate <= 0.0 {
                return Err(SettingsError::InvalidConfig(format!(
                    "rate_limit.requests_per_second must be positive, got {}",
                    rate
                )));
            }
        }
        Ok(())
    }

    /// Fixture path with environment variables expanded.
    pub fn fixture_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.source
            .fixture
            .as_deref()
            .map(|raw| expand_env_vars(raw).map(PathBuf::from))
            .transpose()
    }

    /// Executor limits described by these settings.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            concurrency: self.executor.concurrency.max(1),
            max_records: self.executor.max_records,
            timeout: Duration::from_secs(self.executor.timeout_seconds),
            requests_per_second: self.rate_limit.requests_per_second,
            burst: self.rate_limit.burst.max(1),
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let var_name = if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let name: String = chars.by_ref().take_while(|&ch| ch != '}').collect();
            Some(name)
        } else {
            // $VAR ends at the first non-alphanumeric, non-underscore char
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            (!name.is_empty()).then_some(name)
        };

        match var_name {
            Some(name) => {
                let value =
                    env::var(&name).map_err(|_| SettingsError::MissingEnvVar(name.clone()))?;
                result.push_str(&value);
            }
            // Just a lone $, keep it
            None => result.push('$'),
        }
    }

    Ok(result)
}
