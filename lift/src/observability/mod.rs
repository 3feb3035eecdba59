//! Telemetry: process-local tracing plus the buffered remote sink
//!
//! Two independent pipelines ship data to a remote telemetry backend in the
//! background: the [`Logger`](logger::Logger) batches structured log entries
//! and the [`MetricsCollector`](metrics::MetricsCollector) aggregates metric
//! data points. Both are non-blocking at the emission site; a full buffer
//! drops the datum rather than stalling request handling, and transport
//! failures are counted but never surfaced to callers.

pub mod logger;
pub mod metrics;

pub use logger::{LogEntry, LogLevel, LogTransport, Logger, LoggerConfig, LoggerStatsSnapshot};
pub use metrics::{
    MetricDatum, MetricUnit, MetricsCollector, MetricsConfig, MetricsStatsSnapshot,
    MetricsTransport,
};

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;

/// Initialize process-local tracing
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}
