//! Buffered, batched shipping of structured log entries
//!
//! Entries flow through a bounded channel to a background worker that flushes
//! in batches: when the batch fills, on a periodic interval, on an explicit
//! [`Logger::flush`], and at shutdown. When the channel is full the entry is
//! dropped and counted; logging never stalls request handling. The remote
//! transport is a port modeled on log services that require an ordered
//! sequence token per put; the worker threads the returned token through
//! consecutive calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{LiftError, Result};
use crate::sanitize::sanitize_field_value;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// A structured log entry as shipped to the backend
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// Remote transport for log batches
///
/// Mirrors log-service APIs that require ordered puts: each call receives
/// the token returned by the previous one and yields the next.
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn put_batch(
        &self,
        entries: Vec<LogEntry>,
        sequence_token: Option<String>,
    ) -> Result<Option<String>>;
}

/// Tuning for the log pipeline
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Capacity of the bounded entry channel
    pub buffer_size: usize,
    /// Entries per shipped batch
    pub batch_size: usize,
    /// Periodic flush interval
    pub flush_interval: Duration,
    /// Deadline per remote put
    pub flush_timeout: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            batch_size: 64,
            flush_interval: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct LoggerStats {
    entries_logged: AtomicU64,
    entries_dropped: AtomicU64,
    flush_count: AtomicU64,
    error_count: AtomicU64,
    total_flush_micros: AtomicU64,
    last_flush: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time view of the pipeline counters
#[derive(Debug, Clone)]
pub struct LoggerStatsSnapshot {
    pub entries_logged: u64,
    pub entries_dropped: u64,
    pub flush_count: u64,
    pub error_count: u64,
    pub last_flush: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub average_flush_time: Duration,
}

enum Control {
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Cheap-clone handle for emitting structured log entries
///
/// Clones share the channel and counters. [`Logger::with_fields`] and the
/// id-scoping helpers return a child handle whose base fields are merged
/// into every entry it emits, later additions overriding earlier ones.
#[derive(Clone)]
pub struct Logger {
    tx: mpsc::Sender<LogEntry>,
    control: mpsc::UnboundedSender<Control>,
    stats: Arc<LoggerStats>,
    cancel: CancellationToken,
    base_fields: Map<String, Value>,
    request_id: Option<String>,
    tenant_id: Option<String>,
    user_id: Option<String>,
    trace_id: Option<String>,
    span_id: Option<String>,
}

impl Logger {
    /// Create a logger and spawn its background shipping worker
    pub fn new(transport: Arc<dyn LogTransport>, config: LoggerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(LoggerStats::default());
        let cancel = CancellationToken::new();

        tokio::spawn(worker(
            rx,
            control_rx,
            transport,
            config,
            stats.clone(),
            cancel.clone(),
        ));

        Self {
            tx,
            control: control_tx,
            stats,
            cancel,
            base_fields: Map::new(),
            request_id: None,
            tenant_id: None,
            user_id: None,
            trace_id: None,
            span_id: None,
        }
    }

    // ------------------------------------------------------------------
    // Scoping
    // ------------------------------------------------------------------

    /// Child logger with extra base fields merged into every entry
    pub fn with_fields(&self, fields: Map<String, Value>) -> Self {
        let mut child = self.clone();
        for (k, v) in fields {
            child.base_fields.insert(k, v);
        }
        child
    }

    /// Child logger with a single extra base field
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut child = self.clone();
        child.base_fields.insert(key.into(), value.into());
        child
    }

    pub fn with_request_id(&self, request_id: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.request_id = Some(request_id.into());
        child
    }

    pub fn with_tenant(&self, tenant_id: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.tenant_id = Some(tenant_id.into());
        child
    }

    pub fn with_user(&self, user_id: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.user_id = Some(user_id.into());
        child
    }

    pub fn with_trace(&self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.trace_id = Some(trace_id.into());
        child.span_id = Some(span_id.into());
        child
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, Map::new());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, Map::new());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, Map::new());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, Map::new());
    }

    pub fn debug_with(&self, message: impl Into<String>, fields: Map<String, Value>) {
        self.log(LogLevel::Debug, message, fields);
    }

    pub fn info_with(&self, message: impl Into<String>, fields: Map<String, Value>) {
        self.log(LogLevel::Info, message, fields);
    }

    pub fn warn_with(&self, message: impl Into<String>, fields: Map<String, Value>) {
        self.log(LogLevel::Warn, message, fields);
    }

    pub fn error_with(&self, message: impl Into<String>, fields: Map<String, Value>) {
        self.log(LogLevel::Error, message, fields);
    }

    /// Build, sanitize and enqueue an entry without blocking
    ///
    /// Base fields apply first; the per-call map overrides on key collision.
    /// A full channel drops the entry and bumps `entries_dropped`.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, fields: Map<String, Value>) {
        let mut merged = self.base_fields.clone();
        for (k, v) in fields {
            merged.insert(k, v);
        }
        let sanitized: Map<String, Value> = merged
            .iter()
            .map(|(k, v)| (k.clone(), sanitize_field_value(k, v)))
            .collect();

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            request_id: self.request_id.clone(),
            tenant_id: self.tenant_id.clone(),
            user_id: self.user_id.clone(),
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            fields: sanitized,
        };

        match self.tx.try_send(entry) {
            Ok(()) => {
                self.stats.entries_logged.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.entries_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Flush buffered entries and wait for the put to complete
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.control
            .send(Control::Flush(ack))
            .map_err(|_| LiftError::system("log worker is gone"))?;
        done.await
            .map_err(|_| LiftError::system("log worker dropped flush ack"))
    }

    /// Drain remaining entries, flush, and stop the worker
    pub async fn close(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        if self.control.send(Control::Shutdown(ack)).is_err() {
            return Ok(());
        }
        let _ = done.await;
        self.cancel.cancel();
        Ok(())
    }

    /// True unless transport errors exceed 10% of logged entries
    pub fn is_healthy(&self) -> bool {
        let logged = self.stats.entries_logged.load(Ordering::Relaxed);
        let errors = self.stats.error_count.load(Ordering::Relaxed);
        errors * 10 <= logged
    }

    /// Counter snapshot
    pub fn stats(&self) -> LoggerStatsSnapshot {
        let flushes = self.stats.flush_count.load(Ordering::Relaxed);
        let total_micros = self.stats.total_flush_micros.load(Ordering::Relaxed);
        let average = if flushes > 0 {
            Duration::from_micros(total_micros / flushes)
        } else {
            Duration::ZERO
        };
        LoggerStatsSnapshot {
            entries_logged: self.stats.entries_logged.load(Ordering::Relaxed),
            entries_dropped: self.stats.entries_dropped.load(Ordering::Relaxed),
            flush_count: flushes,
            error_count: self.stats.error_count.load(Ordering::Relaxed),
            last_flush: *self.stats.last_flush.lock().unwrap_or_else(|e| e.into_inner()),
            last_error: self
                .stats
                .last_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            average_flush_time: average,
        }
    }
}

async fn worker(
    mut rx: mpsc::Receiver<LogEntry>,
    mut control: mpsc::UnboundedReceiver<Control>,
    transport: Arc<dyn LogTransport>,
    config: LoggerConfig,
    stats: Arc<LoggerStats>,
    cancel: CancellationToken,
) {
    let mut batch: Vec<LogEntry> = Vec::with_capacity(config.batch_size);
    // The sequence token survives across flushes; the transport contract
    // requires the previous token on the next put.
    let sequence_token: Mutex<Option<String>> = Mutex::new(None);
    let mut interval = tokio::time::interval(config.flush_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            entry = rx.recv() => match entry {
                Some(entry) => {
                    batch.push(entry);
                    if batch.len() >= config.batch_size {
                        flush_batch(&transport, &config, &stats, &sequence_token, &mut batch).await;
                    }
                }
                None => {
                    flush_batch(&transport, &config, &stats, &sequence_token, &mut batch).await;
                    break;
                }
            },
            cmd = control.recv() => match cmd {
                Some(Control::Flush(ack)) => {
                    drain_pending(&mut rx, &mut batch);
                    flush_batch(&transport, &config, &stats, &sequence_token, &mut batch).await;
                    let _ = ack.send(());
                }
                Some(Control::Shutdown(ack)) => {
                    drain_pending(&mut rx, &mut batch);
                    flush_batch(&transport, &config, &stats, &sequence_token, &mut batch).await;
                    let _ = ack.send(());
                    break;
                }
                None => break,
            },
            _ = interval.tick() => {
                if !batch.is_empty() {
                    flush_batch(&transport, &config, &stats, &sequence_token, &mut batch).await;
                }
            },
            _ = cancel.cancelled() => {
                drain_pending(&mut rx, &mut batch);
                flush_batch(&transport, &config, &stats, &sequence_token, &mut batch).await;
                break;
            }
        }
    }
}

fn drain_pending(rx: &mut mpsc::Receiver<LogEntry>, batch: &mut Vec<LogEntry>) {
    while let Ok(entry) = rx.try_recv() {
        batch.push(entry);
    }
}

async fn flush_batch(
    transport: &Arc<dyn LogTransport>,
    config: &LoggerConfig,
    stats: &Arc<LoggerStats>,
    sequence_token: &Mutex<Option<String>>,
    batch: &mut Vec<LogEntry>,
) {
    if batch.is_empty() {
        return;
    }
    let entries = std::mem::take(batch);
    let token = sequence_token
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    let started = std::time::Instant::now();

    let outcome = tokio::time::timeout(config.flush_timeout, transport.put_batch(entries, token)).await;
    match outcome {
        Ok(Ok(next_token)) => {
            *sequence_token.lock().unwrap_or_else(|e| e.into_inner()) = next_token;
            stats.flush_count.fetch_add(1, Ordering::Relaxed);
            stats
                .total_flush_micros
                .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
            *stats.last_flush.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        }
        Ok(Err(err)) => {
            stats.error_count.fetch_add(1, Ordering::Relaxed);
            *stats.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
            tracing::warn!(error = %err, "log batch shipping failed");
        }
        Err(_) => {
            stats.error_count.fetch_add(1, Ordering::Relaxed);
            *stats.last_error.lock().unwrap_or_else(|e| e.into_inner()) =
                Some("flush timed out".to_string());
            tracing::warn!("log batch shipping timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingTransport {
        batches: Mutex<Vec<Vec<LogEntry>>>,
        tokens_seen: Mutex<Vec<Option<String>>>,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl LogTransport for RecordingTransport {
        async fn put_batch(
            &self,
            entries: Vec<LogEntry>,
            sequence_token: Option<String>,
        ) -> Result<Option<String>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LiftError::network("backend unavailable"));
            }
            self.tokens_seen.lock().unwrap().push(sequence_token);
            let count = {
                let mut batches = self.batches.lock().unwrap();
                batches.push(entries);
                batches.len()
            };
            Ok(Some(format!("seq-{count}")))
        }
    }

    fn fast_config() -> LoggerConfig {
        LoggerConfig {
            buffer_size: 16,
            batch_size: 4,
            flush_interval: Duration::from_secs(60),
            flush_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn entries_flush_on_explicit_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Logger::new(transport.clone(), fast_config());

        logger.info("one");
        logger.warn("two");
        logger.flush().await.unwrap();

        let batches = transport.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].message, "one");
        assert_eq!(batches[0][1].level, LogLevel::Warn);
    }

    #[tokio::test]
    async fn batch_size_triggers_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Logger::new(transport.clone(), fast_config());

        for i in 0..4 {
            logger.info(format!("entry {i}"));
        }
        // Wait for the worker to pick up the fourth entry and ship.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if !transport.batches.lock().unwrap().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(transport.batches.lock().unwrap()[0].len(), 4);
    }

    #[tokio::test]
    async fn sequence_token_is_threaded_between_puts() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Logger::new(transport.clone(), fast_config());

        logger.info("a");
        logger.flush().await.unwrap();
        logger.info("b");
        logger.flush().await.unwrap();

        let tokens = transport.tokens_seen.lock().unwrap();
        assert_eq!(tokens[0], None);
        assert_eq!(tokens[1].as_deref(), Some("seq-1"));
    }

    #[tokio::test]
    async fn sensitive_fields_are_redacted_before_buffering() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Logger::new(transport.clone(), fast_config());

        let mut fields = Map::new();
        fields.insert("password".to_string(), json!("hunter2"));
        fields.insert("attempt".to_string(), json!(3));
        logger.info_with("login failed", fields);
        logger.flush().await.unwrap();

        let batches = transport.batches.lock().unwrap();
        let entry = &batches[0][0];
        assert_eq!(entry.fields["password"], json!("[REDACTED]"));
        assert_eq!(entry.fields["attempt"], json!(3));
    }

    #[tokio::test]
    async fn full_channel_drops_without_blocking() {
        let transport = Arc::new(RecordingTransport::default());
        let config = LoggerConfig {
            buffer_size: 2,
            batch_size: 1000,
            flush_interval: Duration::from_secs(3600),
            flush_timeout: Duration::from_secs(1),
        };
        let logger = Logger::new(transport, config);

        let started = std::time::Instant::now();
        for i in 0..100 {
            logger.info(format!("burst {i}"));
        }
        // Emission must stay constant-time even with the channel saturated.
        assert!(started.elapsed() < Duration::from_millis(500));
        let stats = logger.stats();
        assert!(stats.entries_dropped > 0);
        assert_eq!(stats.entries_dropped + stats.entries_logged, 100);
    }

    #[tokio::test]
    async fn transport_failures_flip_health() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Logger::new(transport.clone(), fast_config());
        transport.fail.store(true, Ordering::SeqCst);

        logger.info("doomed");
        logger.flush().await.unwrap();

        let stats = logger.stats();
        assert_eq!(stats.error_count, 1);
        assert!(stats.last_error.unwrap().contains("[NETWORK_ERROR]"));
        // 1 error out of 1 logged entry far exceeds the 10% budget.
        assert!(!logger.is_healthy());
    }

    #[tokio::test]
    async fn scoped_fields_merge_in_order() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Logger::new(transport.clone(), fast_config())
            .with_field("component", "pool")
            .with_request_id("r-1")
            .with_tenant("t-1");

        let mut overrides = Map::new();
        overrides.insert("component".to_string(), json!("router"));
        logger.info_with("dispatch", overrides);
        logger.flush().await.unwrap();

        let batches = transport.batches.lock().unwrap();
        let entry = &batches[0][0];
        assert_eq!(entry.fields["component"], json!("router"));
        assert_eq!(entry.request_id.as_deref(), Some("r-1"));
        assert_eq!(entry.tenant_id.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn close_drains_remaining_entries() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Logger::new(transport.clone(), fast_config());

        logger.info("late entry");
        logger.close().await.unwrap();

        let batches = transport.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].message, "late entry");
    }
}
