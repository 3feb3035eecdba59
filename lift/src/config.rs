//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following
//! precedence (highest to lowest):
//! 1. Environment variables (prefix: LIFT_)
//! 2. Current working directory: ./lift.toml
//! 3. Default values

use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceSettings,

    /// Resource pool defaults
    #[serde(default)]
    pub pool: PoolSettings,

    /// Remote log pipeline configuration
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Metrics pipeline configuration
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            environment: default_environment(),
        }
    }
}

/// Resource pool defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_min_idle")]
    pub min_idle: usize,

    #[serde(default = "default_max_active")]
    pub max_active: usize,

    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,

    #[serde(default = "default_get_timeout_secs")]
    pub get_timeout_secs: u64,

    #[serde(default = "default_health_interval_secs")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_false")]
    pub pre_warm: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_idle: default_min_idle(),
            max_active: default_max_active(),
            max_idle: default_max_idle(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
            get_timeout_secs: default_get_timeout_secs(),
            health_check_interval_secs: default_health_interval_secs(),
            pre_warm: false,
        }
    }
}

impl PoolSettings {
    /// Convert into the pool's own config type
    pub fn to_pool_config(&self) -> crate::pool::PoolConfig {
        crate::pool::PoolConfig {
            min_idle: self.min_idle,
            max_active: self.max_active,
            max_idle: self.max_idle,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_lifetime: Duration::from_secs(self.max_lifetime_secs),
            get_timeout: Duration::from_secs(self.get_timeout_secs),
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            pre_warm: self.pre_warm,
        }
    }
}

/// Remote log pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSettings {
    #[serde(default = "default_log_buffer")]
    pub buffer_size: usize,

    #[serde(default = "default_log_batch")]
    pub batch_size: usize,

    #[serde(default = "default_log_flush_ms")]
    pub flush_interval_ms: u64,

    /// Remote log group name
    #[serde(default)]
    pub log_group: Option<String>,

    /// Remote log stream name
    #[serde(default)]
    pub log_stream: Option<String>,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            buffer_size: default_log_buffer(),
            batch_size: default_log_batch(),
            flush_interval_ms: default_log_flush_ms(),
            log_group: None,
            log_stream: None,
        }
    }
}

impl LoggerSettings {
    /// Convert into the logger's own config type
    pub fn to_logger_config(&self) -> crate::observability::LoggerConfig {
        crate::observability::LoggerConfig {
            buffer_size: self.buffer_size,
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            ..crate::observability::LoggerConfig::default()
        }
    }
}

/// Metrics pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    #[serde(default = "default_metric_buffer")]
    pub buffer_size: usize,

    #[serde(default = "default_metric_flush_size")]
    pub flush_size: usize,

    #[serde(default = "default_metric_flush_ms")]
    pub flush_interval_ms: u64,

    /// Metrics namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            buffer_size: default_metric_buffer(),
            flush_size: default_metric_flush_size(),
            flush_interval_ms: default_metric_flush_ms(),
            namespace: default_namespace(),
        }
    }
}

impl MetricsSettings {
    /// Convert into the collector's own config type
    pub fn to_metrics_config(&self) -> crate::observability::MetricsConfig {
        crate::observability::MetricsConfig {
            namespace: self.namespace.clone(),
            buffer_size: self.buffer_size,
            flush_size: self.flush_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            ..crate::observability::MetricsConfig::default()
        }
    }
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Environment variables (LIFT_ prefix) override `./lift.toml`, which
    /// overrides the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from("lift.toml")
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("LIFT_").split("_"))
            .extract()?;
        Ok(config)
    }
}

/// Runtime environment the process is executing in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Hosted on the managed FaaS platform
    Lambda,
    /// Local development or test process
    Local,
}

impl Environment {
    /// Detect the environment from the platform's well-known variables
    pub fn detect() -> Self {
        const MARKERS: &[&str] = &[
            "AWS_LAMBDA_FUNCTION_NAME",
            "LAMBDA_TASK_ROOT",
            "AWS_EXECUTION_ENV",
        ];
        if MARKERS.iter().any(|var| std::env::var_os(var).is_some()) {
            Self::Lambda
        } else {
            Self::Local
        }
    }

    /// True when hosted on the platform
    pub fn is_hosted(&self) -> bool {
        matches!(self, Self::Lambda)
    }
}

fn default_service_name() -> String {
    "lift".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_min_idle() -> usize {
    2
}

fn default_max_active() -> usize {
    10
}

fn default_max_idle() -> usize {
    5
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_max_lifetime_secs() -> u64 {
    3600
}

fn default_get_timeout_secs() -> u64 {
    5
}

fn default_health_interval_secs() -> u64 {
    30
}

fn default_false() -> bool {
    false
}

fn default_log_buffer() -> usize {
    1024
}

fn default_log_batch() -> usize {
    64
}

fn default_log_flush_ms() -> u64 {
    5000
}

fn default_metric_buffer() -> usize {
    1000
}

fn default_metric_flush_size() -> usize {
    100
}

fn default_metric_flush_ms() -> u64 {
    10000
}

fn default_namespace() -> String {
    "lift".to_string()
}
