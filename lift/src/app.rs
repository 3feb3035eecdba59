//! Application shell: registration surface and per-invocation entry point
//!
//! An [`App`] owns the three routers, the middleware list, and the adapter
//! registry, plus the optional logger / metrics / connection-store handles
//! it injects into every context. `start` freezes the middleware into the
//! routers (idempotent); [`App::handle_request`] is the per-invocation entry
//! point the platform runtime calls with the raw envelope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};

use crate::adapter::{default_registry, AdapterRegistry};
use crate::connection::ConnectionStore;
use crate::context::Context;
use crate::error::LiftError;
use crate::handler::{Handler, Middleware};
use crate::observability::{Logger, MetricsCollector};
use crate::request::TriggerType;
use crate::router::{
    EventRouter, HttpRouter, WebSocketRouter, ROUTE_CONNECT, ROUTE_DEFAULT, ROUTE_DISCONNECT,
};

/// The application shell
pub struct App {
    http_router: Arc<HttpRouter>,
    event_router: Arc<EventRouter>,
    ws_router: Arc<WebSocketRouter>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    registry: Arc<AdapterRegistry>,
    logger: RwLock<Option<Logger>>,
    metrics: RwLock<Option<MetricsCollector>>,
    connections: RwLock<Option<Arc<dyn ConnectionStore>>>,
    has_intercepting_middleware: AtomicBool,
    started: AtomicBool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Create an app with the default adapter registry
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    /// Create an app with a custom adapter registry
    pub fn with_registry(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            http_router: Arc::new(HttpRouter::new()),
            event_router: Arc::new(EventRouter::new()),
            ws_router: Arc::new(WebSocketRouter::new()),
            middleware: RwLock::new(Vec::new()),
            registry,
            logger: RwLock::new(None),
            metrics: RwLock::new(None),
            connections: RwLock::new(None),
            has_intercepting_middleware: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Dependency injection
    // ------------------------------------------------------------------

    /// Inject the remote log pipeline
    pub fn with_logger(self, logger: Logger) -> Self {
        *self.logger.write().unwrap_or_else(|e| e.into_inner()) = Some(logger);
        self
    }

    /// Inject the metrics collector
    pub fn with_metrics(self, metrics: MetricsCollector) -> Self {
        *self.metrics.write().unwrap_or_else(|e| e.into_inner()) = Some(metrics);
        self
    }

    /// Inject a connection store and enable auto connection management
    pub fn with_connection_store(self, store: Arc<dyn ConnectionStore>) -> Self {
        self.ws_router.enable_auto_connection_management(store.clone());
        *self.connections.write().unwrap_or_else(|e| e.into_inner()) = Some(store);
        self
    }

    // ------------------------------------------------------------------
    // Registration surface
    // ------------------------------------------------------------------

    pub fn get(&self, path: &str, handler: impl Handler + 'static) {
        self.http_router.add("GET", path, Arc::new(handler));
    }

    pub fn post(&self, path: &str, handler: impl Handler + 'static) {
        self.http_router.add("POST", path, Arc::new(handler));
    }

    pub fn put(&self, path: &str, handler: impl Handler + 'static) {
        self.http_router.add("PUT", path, Arc::new(handler));
    }

    pub fn delete(&self, path: &str, handler: impl Handler + 'static) {
        self.http_router.add("DELETE", path, Arc::new(handler));
    }

    pub fn patch(&self, path: &str, handler: impl Handler + 'static) {
        self.http_router.add("PATCH", path, Arc::new(handler));
    }

    /// Register a queue-batch handler by ARN pattern
    pub fn sqs(&self, arn_pattern: &str, handler: impl Handler + 'static) {
        self.event_router
            .add(TriggerType::Queue, arn_pattern, Arc::new(handler));
    }

    /// Register an object-store handler by bucket/key glob
    pub fn s3(&self, pattern: &str, handler: impl Handler + 'static) {
        self.event_router
            .add(TriggerType::ObjectStore, pattern, Arc::new(handler));
    }

    /// Register an event-bus handler by source or rule pattern
    pub fn event_bridge(&self, pattern: &str, handler: impl Handler + 'static) {
        self.event_router
            .add(TriggerType::EventBus, pattern, Arc::new(handler));
    }

    /// Register a WebSocket handler by route key
    pub fn websocket(&self, route_key: &str, handler: impl Handler + 'static) {
        self.ws_router.add(route_key, Arc::new(handler));
    }

    /// Declarative registration keyed on the method token
    ///
    /// HTTP verbs go to the HTTP router, `SQS`/`S3`/`EventBridge` to the
    /// event router, and `CONNECT`/`DISCONNECT`/`MESSAGE` to the WebSocket
    /// router (`MESSAGE` uses the path as the route key).
    pub fn handle(&self, method: &str, path: &str, handler: impl Handler + 'static) {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        match method.to_uppercase().as_str() {
            "GET" | "POST" | "PUT" | "DELETE" | "PATCH" => {
                self.http_router.add(method, path, handler);
            }
            "SQS" => self.event_router.add(TriggerType::Queue, path, handler),
            "S3" => self
                .event_router
                .add(TriggerType::ObjectStore, path, handler),
            "EVENTBRIDGE" => self.event_router.add(TriggerType::EventBus, path, handler),
            "CONNECT" => self.ws_router.add(ROUTE_CONNECT, handler),
            "DISCONNECT" => self.ws_router.add(ROUTE_DISCONNECT, handler),
            "MESSAGE" => {
                let key = if path.is_empty() { ROUTE_DEFAULT } else { path };
                self.ws_router.add(key, handler);
            }
            other => {
                tracing::warn!(method = other, path, "ignoring route with unknown method token");
            }
        }
    }

    /// Prefix-compounding sub-registrar for HTTP routes
    pub fn group(&self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            app: self,
            prefix: normalize_prefix(prefix),
        }
    }

    /// Append middleware; first registered runs outermost
    ///
    /// Registering middleware that asks for response interception enables
    /// buffering for every subsequent invocation.
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) {
        if middleware.needs_response_interception() {
            self.has_intercepting_middleware
                .store(true, Ordering::SeqCst);
        }
        self.middleware
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(middleware));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Freeze middleware into the routers; idempotent
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let chain = self
            .middleware
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        self.http_router.set_middleware(chain.clone());
        self.event_router.set_middleware(chain.clone());
        self.ws_router.set_middleware(chain);
        tracing::debug!("application started");
    }

    /// Per-invocation entry point
    ///
    /// Adapts the raw envelope, builds the context, dispatches to the
    /// matching router, and serializes the response envelope. Errors never
    /// escape: they are rendered as sanitized error envelopes.
    pub async fn handle_request(&self, raw: Value) -> Value {
        self.start();

        let request = match self.registry.detect(raw) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(code = %err.code, "envelope detection failed");
                return error_envelope(&err);
            }
        };

        let trigger_type = request.trigger_type;
        let platform_request_id = request.meta("requestId").map(str::to_string);

        let mut builder = Context::builder(request);
        if let Some(request_id) = platform_request_id {
            builder = builder.request_id(request_id);
        }
        if self.has_intercepting_middleware.load(Ordering::SeqCst) {
            builder = builder.buffered();
        }
        if let Some(logger) = self.logger.read().unwrap_or_else(|e| e.into_inner()).clone() {
            builder = builder.logger(logger);
        }
        if let Some(metrics) = self.metrics.read().unwrap_or_else(|e| e.into_inner()).clone() {
            builder = builder.metrics(metrics);
        }
        if let Some(store) = self
            .connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            builder = builder.connections(store);
        }
        let ctx = builder.build();

        let result = match trigger_type {
            TriggerType::WebSocket => self.ws_router.handle(ctx.clone()).await,
            t if t.is_http() => self.http_router.handle(ctx.clone()).await,
            _ => self.event_router.handle(ctx.clone()).await,
        };

        match result {
            Ok(()) => ctx.response_envelope(),
            Err(err) => {
                let err = err.with_request_id(ctx.request_id());
                tracing::warn!(
                    request_id = ctx.request_id(),
                    code = %err.code,
                    status = err.status(),
                    "invocation failed"
                );
                if let Some(logger) = ctx.logger() {
                    logger.error(format!("invocation failed: {err}"));
                }
                error_envelope(&err)
            }
        }
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Render an error as a platform response envelope
fn error_envelope(err: &LiftError) -> Value {
    json!({
        "statusCode": err.status(),
        "headers": {"Content-Type": "application/json"},
        "body": err.to_response_body().to_string(),
        "isBase64Encoded": false,
    })
}

/// Prefix-compounding HTTP registrar returned by [`App::group`]
pub struct RouteGroup<'a> {
    app: &'a App,
    prefix: String,
}

impl RouteGroup<'_> {
    fn join(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{path}", self.prefix)
        }
    }

    pub fn get(&self, path: &str, handler: impl Handler + 'static) {
        self.app.get(&self.join(path), handler);
    }

    pub fn post(&self, path: &str, handler: impl Handler + 'static) {
        self.app.post(&self.join(path), handler);
    }

    pub fn put(&self, path: &str, handler: impl Handler + 'static) {
        self.app.put(&self.join(path), handler);
    }

    pub fn delete(&self, path: &str, handler: impl Handler + 'static) {
        self.app.delete(&self.join(path), handler);
    }

    pub fn patch(&self, path: &str, handler: impl Handler + 'static) {
        self.app.patch(&self.join(path), handler);
    }

    /// Nested group compounding this prefix
    pub fn group(&self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            app: self.app,
            prefix: format!("{}{}", self.prefix, normalize_prefix(prefix)),
        }
    }
}
