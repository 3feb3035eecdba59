//! Buffered metric aggregation with dimension scoping
//!
//! Data points land in a ring buffer; on overflow the oldest points are
//! dropped so recent activity survives. A background worker ships the buffer
//! every flush interval or as soon as it reaches the flush size, splitting
//! into sub-batches of at most twenty per remote call. A failed sub-batch is
//! counted and skipped without aborting the rest of the flush.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Largest sub-batch a single remote call may carry
const MAX_BATCH: usize = 20;

/// Measurement unit attached to a data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricUnit {
    Count,
    Milliseconds,
    Seconds,
    Bytes,
    None,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "Count",
            Self::Milliseconds => "Milliseconds",
            Self::Seconds => "Seconds",
            Self::Bytes => "Bytes",
            Self::None => "None",
        }
    }
}

/// A single metric data point
#[derive(Debug, Clone, Serialize)]
pub struct MetricDatum {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub timestamp: DateTime<Utc>,
    /// Dimension key/value pairs, collector scope included
    pub dimensions: Vec<(String, String)>,
}

/// Remote transport for metric batches
#[async_trait]
pub trait MetricsTransport: Send + Sync {
    async fn put_metrics(&self, namespace: &str, data: Vec<MetricDatum>) -> Result<()>;
}

/// Tuning for the metrics pipeline
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Metrics namespace passed to the transport
    pub namespace: String,
    /// Ring-buffer capacity
    pub buffer_size: usize,
    /// Buffered count that triggers an early flush
    pub flush_size: usize,
    /// Periodic flush interval
    pub flush_interval: Duration,
    /// Deadline per remote call
    pub flush_timeout: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "lift".to_string(),
            buffer_size: 1000,
            flush_size: 100,
            flush_interval: Duration::from_secs(10),
            flush_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct MetricsStats {
    datapoints_emitted: AtomicU64,
    datapoints_overflowed: AtomicU64,
    metrics_dropped: AtomicU64,
    flush_count: AtomicU64,
}

/// Point-in-time view of the pipeline counters
#[derive(Debug, Clone)]
pub struct MetricsStatsSnapshot {
    pub datapoints_emitted: u64,
    /// Oldest points displaced by ring-buffer overflow
    pub datapoints_overflowed: u64,
    /// Points lost to failed transport sub-batches
    pub metrics_dropped: u64,
    pub flush_count: u64,
}

struct CollectorInner {
    buffer: Mutex<VecDeque<MetricDatum>>,
    transport: Arc<dyn MetricsTransport>,
    config: MetricsConfig,
    stats: MetricsStats,
    flush_now: Notify,
    cancel: CancellationToken,
}

/// Cheap-clone metric collector
///
/// [`MetricsCollector::with_dimensions`] returns a collector that shares the
/// underlying buffer but stamps additional dimensions onto every data point
/// it emits; [`MetricsCollector::with_tenant`] is the canonical sugar.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<CollectorInner>,
    dimensions: Vec<(String, String)>,
}

impl MetricsCollector {
    /// Create a collector and spawn its background flush worker
    pub fn new(transport: Arc<dyn MetricsTransport>, config: MetricsConfig) -> Self {
        let inner = Arc::new(CollectorInner {
            buffer: Mutex::new(VecDeque::with_capacity(config.buffer_size.max(1))),
            transport,
            config,
            stats: MetricsStats::default(),
            flush_now: Notify::new(),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(worker(inner.clone()));

        Self {
            inner,
            dimensions: Vec::new(),
        }
    }

    /// Collector sharing this buffer with extra dimensions on every datum
    pub fn with_dimensions<I, K, V>(&self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut scoped = self.clone();
        scoped
            .dimensions
            .extend(dimensions.into_iter().map(|(k, v)| (k.into(), v.into())));
        scoped
    }

    /// Tenant-scoped collector
    pub fn with_tenant(&self, tenant_id: impl Into<String>) -> Self {
        self.with_dimensions([("tenant_id".to_string(), tenant_id.into())])
    }

    /// Record a raw data point
    ///
    /// Non-blocking: a full ring drops the oldest point so the most recent
    /// `buffer_size` points are always retained.
    pub fn emit(&self, name: impl Into<String>, value: f64, unit: MetricUnit) {
        let datum = MetricDatum {
            name: name.into(),
            value,
            unit,
            timestamp: Utc::now(),
            dimensions: self.dimensions.clone(),
        };

        let should_flush = {
            let mut buffer = self.inner.buffer.lock().unwrap_or_else(|e| e.into_inner());
            if buffer.len() >= self.inner.config.buffer_size {
                buffer.pop_front();
                self.inner
                    .stats
                    .datapoints_overflowed
                    .fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(datum);
            buffer.len() >= self.inner.config.flush_size
        };
        self.inner
            .stats
            .datapoints_emitted
            .fetch_add(1, Ordering::Relaxed);

        if should_flush {
            self.inner.flush_now.notify_one();
        }
    }

    /// Count occurrences
    pub fn count(&self, name: impl Into<String>, value: f64) {
        self.emit(name, value, MetricUnit::Count);
    }

    /// Record an instantaneous level
    pub fn gauge(&self, name: impl Into<String>, value: f64) {
        self.emit(name, value, MetricUnit::None);
    }

    /// Record a duration observation in milliseconds
    pub fn histogram(&self, name: impl Into<String>, millis: f64) {
        self.emit(name, millis, MetricUnit::Milliseconds);
    }

    /// Ship everything currently buffered and wait for completion
    pub async fn flush(&self) -> Result<()> {
        flush_buffered(&self.inner).await;
        Ok(())
    }

    /// Flush and stop the background worker
    pub async fn close(&self) -> Result<()> {
        self.inner.cancel.cancel();
        flush_buffered(&self.inner).await;
        Ok(())
    }

    /// Counter snapshot
    pub fn stats(&self) -> MetricsStatsSnapshot {
        MetricsStatsSnapshot {
            datapoints_emitted: self.inner.stats.datapoints_emitted.load(Ordering::Relaxed),
            datapoints_overflowed: self
                .inner
                .stats
                .datapoints_overflowed
                .load(Ordering::Relaxed),
            metrics_dropped: self.inner.stats.metrics_dropped.load(Ordering::Relaxed),
            flush_count: self.inner.stats.flush_count.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> Vec<MetricDatum> {
        self.inner
            .buffer
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }
}

async fn worker(inner: Arc<CollectorInner>) {
    let mut interval = tokio::time::interval(inner.config.flush_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => flush_buffered(&inner).await,
            _ = inner.flush_now.notified() => flush_buffered(&inner).await,
            _ = inner.cancel.cancelled() => {
                flush_buffered(&inner).await;
                break;
            }
        }
    }
}

async fn flush_buffered(inner: &Arc<CollectorInner>) {
    let drained: Vec<MetricDatum> = {
        let mut buffer = inner.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.drain(..).collect()
    };
    if drained.is_empty() {
        return;
    }

    for chunk in drained.chunks(MAX_BATCH) {
        let put = inner
            .transport
            .put_metrics(&inner.config.namespace, chunk.to_vec());
        match tokio::time::timeout(inner.config.flush_timeout, put).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                inner
                    .stats
                    .metrics_dropped
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                tracing::warn!(error = %err, "metric sub-batch shipping failed");
            }
            Err(_) => {
                inner
                    .stats
                    .metrics_dropped
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                tracing::warn!("metric sub-batch shipping timed out");
            }
        }
    }
    inner.stats.flush_count.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LiftError;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<Vec<MetricDatum>>>,
        fail_batches_containing: Mutex<Option<String>>,
    }

    #[async_trait]
    impl MetricsTransport for RecordingTransport {
        async fn put_metrics(&self, _namespace: &str, data: Vec<MetricDatum>) -> Result<()> {
            if let Some(needle) = self.fail_batches_containing.lock().unwrap().as_deref() {
                if data.iter().any(|d| d.name == needle) {
                    return Err(LiftError::network("backend unavailable"));
                }
            }
            self.calls.lock().unwrap().push(data);
            Ok(())
        }
    }

    fn idle_config(buffer_size: usize, flush_size: usize) -> MetricsConfig {
        MetricsConfig {
            namespace: "test".to_string(),
            buffer_size,
            flush_size,
            flush_interval: Duration::from_secs(3600),
            flush_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_points() {
        let transport = Arc::new(RecordingTransport::default());
        let collector = MetricsCollector::new(transport, idle_config(5, 1000));

        for i in 0..12 {
            collector.gauge(format!("m{i}"), i as f64);
        }

        let buffered = collector.buffered();
        assert_eq!(buffered.len(), 5);
        // Most recent five survive.
        let names: Vec<&str> = buffered.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["m7", "m8", "m9", "m10", "m11"]);
        assert_eq!(collector.stats().datapoints_overflowed, 7);
    }

    #[tokio::test]
    async fn flush_ships_in_sub_batches_of_twenty() {
        let transport = Arc::new(RecordingTransport::default());
        let collector = MetricsCollector::new(transport.clone(), idle_config(100, 1000));

        for i in 0..45 {
            collector.count(format!("c{i}"), 1.0);
        }
        collector.flush().await.unwrap();

        let calls = transport.calls.lock().unwrap();
        let sizes: Vec<usize> = calls.iter().map(Vec::len).collect();
        assert_eq!(sizes, [20, 20, 5]);
    }

    #[tokio::test]
    async fn failed_sub_batch_does_not_abort_the_rest() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.fail_batches_containing.lock().unwrap() = Some("c0".to_string());
        let collector = MetricsCollector::new(transport.clone(), idle_config(100, 1000));

        for i in 0..25 {
            collector.count(format!("c{i}"), 1.0);
        }
        collector.flush().await.unwrap();

        // First chunk (containing c0) failed, second chunk landed.
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 5);
        assert_eq!(collector.stats().metrics_dropped, 20);
    }

    #[tokio::test]
    async fn dimension_scoping_shares_the_buffer() {
        let transport = Arc::new(RecordingTransport::default());
        let collector = MetricsCollector::new(transport.clone(), idle_config(100, 1000));
        let scoped = collector.with_tenant("t-1");

        collector.count("requests", 1.0);
        scoped.count("requests", 1.0);
        collector.flush().await.unwrap();

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].len(), 2);
        assert!(calls[0][0].dimensions.is_empty());
        assert_eq!(
            calls[0][1].dimensions,
            vec![("tenant_id".to_string(), "t-1".to_string())]
        );
    }

    #[tokio::test]
    async fn flush_size_triggers_background_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let collector = MetricsCollector::new(transport.clone(), idle_config(100, 3));

        collector.count("a", 1.0);
        collector.count("b", 1.0);
        collector.count("c", 1.0);

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if !transport.calls.lock().unwrap().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(transport.calls.lock().unwrap()[0].len(), 3);
    }

    #[tokio::test]
    async fn units_map_to_stable_names() {
        assert_eq!(MetricUnit::Count.as_str(), "Count");
        assert_eq!(MetricUnit::Milliseconds.as_str(), "Milliseconds");
        assert_eq!(MetricUnit::None.as_str(), "None");
    }
}
