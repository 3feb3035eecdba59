//! Built-in middleware: panic recovery, request logging, request metrics

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{LiftError, Result};
use crate::handler::{Middleware, Next};
use crate::observability::MetricUnit;

/// Catches panics escaping the rest of the chain
///
/// The wrapped chain runs on its own task so an unwind is contained there;
/// the panic is logged with its captured message and surfaces as a
/// sanitized 500.
pub struct RecoveryMiddleware;

#[async_trait]
impl Middleware for RecoveryMiddleware {
    async fn call(&self, ctx: Context, next: Next) -> Result<()> {
        let task_ctx = ctx.clone();
        let outcome = tokio::spawn(async move { next.run(task_ctx).await }).await;
        match outcome {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());

                tracing::error!(
                    request_id = ctx.request_id(),
                    panic = %message,
                    "handler panicked"
                );
                if let Some(logger) = ctx.logger() {
                    logger.error(format!("handler panicked: {message}"));
                }
                Err(LiftError::system("internal handler failure").with_stack(message))
            }
            Err(join_err) => Err(LiftError::system(format!("handler task failed: {join_err}"))),
        }
    }
}

/// Logs one line per invocation with trigger, status and duration
pub struct RequestLogger;

#[async_trait]
impl Middleware for RequestLogger {
    async fn call(&self, ctx: Context, next: Next) -> Result<()> {
        let trigger = ctx.request().trigger_type;
        let method = ctx.request().method.clone();
        let path = ctx.request().path.clone();

        let result = next.run(ctx.clone()).await;

        let duration_ms = ctx.duration().as_millis();
        let status = ctx.with_response(|r| r.status_code);
        match &result {
            Ok(()) => {
                tracing::info!(
                    request_id = ctx.request_id(),
                    trigger = %trigger,
                    method = %method,
                    path = %path,
                    status,
                    duration_ms,
                    "request completed"
                );
                if let Some(logger) = ctx.logger() {
                    let mut fields = serde_json::Map::new();
                    fields.insert("trigger".to_string(), trigger.as_str().into());
                    fields.insert("status".to_string(), status.into());
                    fields.insert("duration_ms".to_string(), (duration_ms as u64).into());
                    logger.info_with("request completed", fields);
                }
            }
            Err(err) => {
                tracing::warn!(
                    request_id = ctx.request_id(),
                    trigger = %trigger,
                    code = %err.code,
                    duration_ms,
                    "request failed"
                );
                if let Some(logger) = ctx.logger() {
                    let mut fields = serde_json::Map::new();
                    fields.insert("trigger".to_string(), trigger.as_str().into());
                    fields.insert("code".to_string(), err.code.clone().into());
                    fields.insert("duration_ms".to_string(), (duration_ms as u64).into());
                    logger.error_with("request failed", fields);
                }
            }
        }
        result
    }
}

/// Emits request count, duration and error count per invocation
pub struct MetricsMiddleware;

#[async_trait]
impl Middleware for MetricsMiddleware {
    async fn call(&self, ctx: Context, next: Next) -> Result<()> {
        let result = next.run(ctx.clone()).await;

        if let Some(metrics) = ctx.metrics() {
            let scoped = metrics.with_dimensions([(
                "trigger_type".to_string(),
                ctx.request().trigger_type.as_str().to_string(),
            )]);
            scoped.count("requests", 1.0);
            scoped.emit(
                "request_duration",
                ctx.duration().as_secs_f64() * 1000.0,
                MetricUnit::Milliseconds,
            );
            if result.is_err() {
                scoped.count("request_errors", 1.0);
            }
        }
        result
    }
}
