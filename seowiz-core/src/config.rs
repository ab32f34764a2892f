use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::poll::PollOptions;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl From<ConfigLoadError> for crate::error::WizardError {
    fn from(err: ConfigLoadError) -> Self {
        match err {
            ConfigLoadError::LoadError(e) => e.into(),
            ConfigLoadError::MissingRequired(key) => crate::error::WizardError::MissingConfig(key),
            ConfigLoadError::InvalidValue { key, message } => {
                crate::error::WizardError::InvalidConfigValue { key, message }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WizardConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_functions_path")]
    pub functions_path: String,

    #[serde(default = "default_job_status_endpoint")]
    pub job_status_endpoint: String,

    #[serde(default = "default_complete_endpoint")]
    pub complete_endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

/// Fallback budget for job-returning steps that declare none of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub default_interval_ms: u64,

    #[serde(default = "default_poll_attempts")]
    pub default_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_parallel_start")]
    pub parallel_start: u8,

    #[serde(default = "default_parallel_end")]
    pub parallel_end: u8,

    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Where run snapshots are written. Defaults to `<data_dir>/seowiz/runs`.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://localhost:8888".to_string()
}

fn default_functions_path() -> String {
    "/.netlify/functions".to_string()
}

fn default_job_status_endpoint() -> String {
    "seo-job-status".to_string()
}

fn default_complete_endpoint() -> String {
    "seo-mark-setup-complete".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_poll_attempts() -> u32 {
    100
}

fn default_parallel_start() -> u8 {
    40
}

fn default_parallel_end() -> u8 {
    80
}

fn default_sample_interval() -> u64 {
    1000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            functions_path: default_functions_path(),
            job_status_endpoint: default_job_status_endpoint(),
            complete_endpoint: default_complete_endpoint(),
            api_key: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_poll_interval(),
            default_max_attempts: default_poll_attempts(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            parallel_start: default_parallel_start(),
            parallel_end: default_parallel_end(),
            sample_interval_ms: default_sample_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl ApiConfig {
    /// Full URL of a serverless function.
    pub fn function_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.functions_path.trim_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PollingConfig {
    pub fn default_options(&self) -> PollOptions {
        PollOptions::new(
            Duration::from_millis(self.default_interval_ms),
            self.default_max_attempts,
        )
    }
}

impl ProgressConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Map `settled` of `total` parallel steps onto the
    /// `parallel_start..=parallel_end` band.
    pub fn parallel_percent(&self, settled: usize, total: usize) -> u8 {
        let start = self.parallel_start.min(self.parallel_end);
        let end = self.parallel_end;
        if total == 0 {
            return end;
        }
        let span = (end - start) as f64;
        let ratio = settled.min(total) as f64 / total as f64;
        start + (ratio * span).round() as u8
    }
}

impl StorageConfig {
    pub fn snapshot_dir(&self) -> Option<PathBuf> {
        self.snapshot_dir
            .clone()
            .or_else(|| get_data_dir().map(|d| d.join("runs")))
    }
}

impl WizardConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> Result<Self, ConfigLoadError> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SEOWIZ")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut wizard_config: WizardConfig = config.try_deserialize()?;

        if let Ok(url) = std::env::var("SEOWIZ_API_URL") {
            wizard_config.api.base_url = url;
        }

        if let Ok(key) = std::env::var("SEOWIZ_API_KEY") {
            if !key.is_empty() {
                wizard_config.api.api_key = Some(key);
            }
        }

        if let Ok(level) = std::env::var("SEOWIZ_LOG_LEVEL") {
            wizard_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            wizard_config.logging.level = level;
        }

        wizard_config.validate()?;

        Ok(wizard_config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.api.base_url.is_empty() {
            return Err(ConfigLoadError::MissingRequired("api.base_url".to_string()));
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(ConfigLoadError::InvalidValue {
                key: "api.base_url".to_string(),
                message: "Must start with http:// or https://".to_string(),
            });
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "api.timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.polling.default_interval_ms == 0 || self.polling.default_max_attempts == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "polling".to_string(),
                message: "Interval and attempt budget must be greater than 0".to_string(),
            });
        }

        if self.progress.parallel_end > 100 {
            return Err(ConfigLoadError::InvalidValue {
                key: "progress.parallel_end".to_string(),
                message: "Cannot exceed 100".to_string(),
            });
        }

        if self.progress.parallel_start > self.progress.parallel_end {
            return Err(ConfigLoadError::InvalidValue {
                key: "progress.parallel_start".to_string(),
                message: "Cannot be greater than progress.parallel_end".to_string(),
            });
        }

        if self.progress.sample_interval_ms == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "progress.sample_interval_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(ConfigLoadError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        Ok(())
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("seowiz.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("seowiz").join("config.toml"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".seowiz").join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".seowiz").join(".env"));
    }

    for path in paths {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("seowiz"))
}

pub fn get_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("seowiz"))
}
