//! TraceBench configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use tracecollect::{CollectorOptions, DEFAULT_MAX_BUFFERED_SPANS};

use crate::client::{DEFAULT_CONTROL_PATH, DEFAULT_RESULT_PATH};
use crate::workload::DEFAULT_MAX_BYTES_PER_LOG;

/// Main TraceBench configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Experiment controller endpoint
    pub controller: ControllerConfig,

    /// Span collector endpoint
    pub collector: CollectorConfig,

    /// Reporter identity
    pub reporter: ReporterConfig,

    /// Workload limits
    pub workload: WorkloadConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.controller.base_url.is_empty() {
            return Err(eyre::eyre!("controller.base-url must not be empty"));
        }
        if self.collector.base_url.is_empty() {
            return Err(eyre::eyre!("collector.base-url must not be empty"));
        }
        if self.collector.max_buffered_spans == 0 {
            return Err(eyre::eyre!("collector.max-buffered-spans must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: tracebench.yml
        let local_config = PathBuf::from("tracebench.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tracebench/tracebench.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tracebench").join("tracebench.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from("tracebench.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("tracebench").join("tracebench.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Experiment controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Scheme, host and port of the controller
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path returning the next specification
    #[serde(rename = "control-path")]
    pub control_path: String,

    /// Path receiving results
    #[serde(rename = "result-path")]
    pub result_path: String,

    /// Request timeout in milliseconds, 0 for none
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            control_path: DEFAULT_CONTROL_PATH.to_string(),
            result_path: DEFAULT_RESULT_PATH.to_string(),
            timeout_ms: 300_000,
        }
    }
}

impl ControllerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Span collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Scheme, host and port of the collector
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Access token sent with every report
    #[serde(rename = "access-token")]
    pub access_token: String,

    /// Report timeout in milliseconds, 0 for none
    #[serde(rename = "report-timeout-ms")]
    pub report_timeout_ms: u64,

    /// HTTP/2 over cleartext with prior knowledge
    pub plaintext: bool,

    /// Spans held between flushes before new ones are dropped
    #[serde(rename = "max-buffered-spans")]
    pub max_buffered_spans: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            access_token: "ignored".to_string(),
            report_timeout_ms: 30_000,
            plaintext: true,
            max_buffered_spans: DEFAULT_MAX_BUFFERED_SPANS,
        }
    }
}

impl CollectorConfig {
    pub fn options(&self) -> CollectorOptions {
        CollectorOptions {
            base_url: self.base_url.clone(),
            access_token: self.access_token.clone(),
            report_timeout: (self.report_timeout_ms > 0).then(|| Duration::from_millis(self.report_timeout_ms)),
            plaintext: self.plaintext,
        }
    }
}

/// Reporter identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Component name attached to every report
    #[serde(rename = "component-name")]
    pub component_name: String,

    /// Extra process attributes
    pub tags: BTreeMap<String, String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            component_name: "tracebench".to_string(),
            tags: BTreeMap::new(),
        }
    }
}

/// Workload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Size of the shared log payload; larger `BytesPerLog` values are rejected
    #[serde(rename = "max-bytes-per-log")]
    pub max_bytes_per_log: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            max_bytes_per_log: DEFAULT_MAX_BYTES_PER_LOG,
        }
    }
}
