//! Configuration management for the sepsis prediction service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable naming an alternate configuration file
pub const CONFIG_PATH_ENV: &str = "SEPSIS_CONFIG";

/// Storage backend for prediction and upload records
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database file
    #[default]
    Sqlite,
    /// Process memory only, lost on restart
    Memory,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_addr: String,
    /// Header carrying the authenticated user id
    #[serde(default = "default_owner_header")]
    pub owner_header: String,
    /// Request body limit for PDF uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_owner_header() -> String {
    "x-user-id".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

/// ML models configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing ONNX model files
    pub models_dir: String,
    /// Age/sex/episode survival classifier
    #[serde(default = "default_survival_model")]
    pub survival_model: String,
    /// Severity classifier over the same three features
    #[serde(default = "default_severity_model")]
    pub severity_model: String,
    /// JSON label table for the severity classifier
    #[serde(default = "default_severity_labels")]
    pub severity_labels: String,
    /// Eleven-vitals sepsis risk classifier
    #[serde(default = "default_risk_model")]
    pub risk_model: String,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_survival_model() -> String {
    "survival.onnx".to_string()
}

fn default_severity_model() -> String {
    "severity.onnx".to_string()
}

fn default_severity_labels() -> String {
    "severity_labels.json".to_string()
}

fn default_risk_model() -> String {
    "sepsis_risk.onnx".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory holding uploaded PDFs
    pub upload_dir: PathBuf,
}

/// History view configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Entries shown on the dashboard
    pub recent_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { recent_limit: 5 }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl AppConfig {
    /// Load configuration from `SEPSIS_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, layered with `SEPSIS__*` variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("SEPSIS").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:8080".to_string(),
                owner_header: default_owner_header(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            models: ModelsConfig {
                models_dir: "models".to_string(),
                survival_model: default_survival_model(),
                severity_model: default_severity_model(),
                severity_labels: default_severity_labels(),
                risk_model: default_risk_model(),
                onnx_threads: 1,
            },
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                database_path: PathBuf::from("data/predictions.db"),
                upload_dir: PathBuf::from("uploads"),
            },
            history: HistoryConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}
