//! Configuration management for pondmetrics
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section is optional; a missing file means "all defaults".

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "pondmetrics.toml";

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const MAX_OPS_INTERVAL_MS: u64 = 3_600_000;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// `host:port`, or `:port` for every IPv4 interface
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl ServerConfig {
    /// Address in the form `TcpListener::bind` accepts
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }
}

fn default_listen_address() -> String {
    ":8080".to_string()
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Simulated workload that keeps the demo instruments moving
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ops_interval_ms")]
    pub ops_interval_ms: u64,
    #[serde(default = "default_ops_increment")]
    pub ops_increment: f64,
    #[serde(default = "default_temperature_samples")]
    pub temperature_samples: u32,
    #[serde(default = "default_seed_job_type")]
    pub seed_job_type: String,
    #[serde(default = "default_seed_job_count")]
    pub seed_job_count: f64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ops_interval_ms: default_ops_interval_ms(),
            ops_increment: default_ops_increment(),
            temperature_samples: default_temperature_samples(),
            seed_job_type: default_seed_job_type(),
            seed_job_count: default_seed_job_count(),
        }
    }
}

impl WorkloadConfig {
    pub fn ops_interval(&self) -> Duration {
        Duration::from_millis(self.ops_interval_ms)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_ops_interval_ms() -> u64 {
    1000
}

fn default_ops_increment() -> f64 {
    4.0
}

fn default_temperature_samples() -> u32 {
    1000
}

fn default_seed_job_type() -> String {
    "testjob".to_string()
}

fn default_seed_job_count() -> f64 {
    3.0
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: read
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: parse
        let config: Self = toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
            path: path_display.clone(),
            source,
        })?;

        // Phase 3: validate
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: match e {
                    AppError::Config(reason) => reason,
                    other => other.to_string(),
                },
            })?;

        Ok(config)
    }

    /// Load an explicit file, or fall back to `pondmetrics.toml`, or to defaults
    ///
    /// An explicitly named file must exist. The fallback file is only read
    /// when present.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Replace the listen address (command-line override) and re-validate it
    pub fn with_listen_address(mut self, listen_address: impl Into<String>) -> AppResult<Self> {
        self.server.listen_address = listen_address.into();
        validate_listen_address(&self.server.listen_address)?;
        Ok(self)
    }

    /// Validate configuration after parsing
    ///
    /// Called by `from_file()` and `from_str()`; call it yourself when building
    /// a `Config` by hand.
    pub fn validate(&self) -> AppResult<()> {
        validate_listen_address(&self.server.listen_address)?;

        if !VALID_LOG_LEVELS.contains(&self.observability.log_level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level '{}' is not one of {}",
                self.observability.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let workload = &self.workload;
        if workload.ops_interval_ms == 0 || workload.ops_interval_ms > MAX_OPS_INTERVAL_MS {
            return Err(AppError::Config(format!(
                "workload.ops_interval_ms must be between 1 and {}, got {}",
                MAX_OPS_INTERVAL_MS, workload.ops_interval_ms
            )));
        }
        if !workload.ops_increment.is_finite() {
            return Err(AppError::Config(format!(
                "workload.ops_increment must be finite, got {}",
                workload.ops_increment
            )));
        }
        if !workload.seed_job_count.is_finite() {
            return Err(AppError::Config(format!(
                "workload.seed_job_count must be finite, got {}",
                workload.seed_job_count
            )));
        }

        Ok(())
    }
}

fn validate_listen_address(address: &str) -> AppResult<()> {
    let port = address
        .rsplit_once(':')
        .map(|(_, port)| port)
        .ok_or_else(|| {
            AppError::Config(format!(
                "server.listen_address '{}' must have the form host:port or :port",
                address
            ))
        })?;
    port.parse::<u16>().map_err(|_| {
        AppError::Config(format!(
            "server.listen_address '{}' has an invalid port '{}'",
            address, port
        ))
    })?;
    Ok(())
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
            path: "<string>".to_string(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }
}
