//! Per-invocation context carried through the middleware chain
//!
//! A [`Context`] is a cheap-clone handle (`Arc` inner) so middleware, the
//! handler, and any tasks the handler spawns can all hold it. The context
//! exclusively owns its request and response for the lifetime of one
//! invocation; payloads never point back at the context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::connection::ConnectionStore;
use crate::error::{LiftError, Result};
use crate::observability::{Logger, MetricsCollector};
use crate::request::Request;
use crate::response::{Response, ResponseBuffer};

/// Identity claims attached to the invocation
#[derive(Debug, Clone, Default)]
pub struct Claims {
    /// Whether `set_claims` has run
    pub authenticated: bool,
    /// The full claim map as provided
    pub claims: HashMap<String, Value>,
    /// Well-known subject id (`user_id`, falling back to `sub`)
    pub user_id: Option<String>,
    /// Well-known tenant scope
    pub tenant_id: Option<String>,
    /// Optional account scope
    pub account_id: Option<String>,
}

struct ContextInner {
    request: Request,
    response: Mutex<Response>,
    values: RwLock<HashMap<String, Value>>,
    params: RwLock<HashMap<String, String>>,
    claims: RwLock<Claims>,
    request_id: String,
    start: Instant,
    start_time: DateTime<Utc>,
    deadline: Option<Instant>,
    buffer: Option<ResponseBuffer>,
    logger: Option<Logger>,
    metrics: Option<MetricsCollector>,
    connections: Option<Arc<dyn ConnectionStore>>,
}

/// Per-invocation carrier handle
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

/// Builder used by the application shell to assemble a context
pub struct ContextBuilder {
    request: Request,
    request_id: Option<String>,
    deadline: Option<Instant>,
    buffer: Option<ResponseBuffer>,
    logger: Option<Logger>,
    metrics: Option<MetricsCollector>,
    connections: Option<Arc<dyn ConnectionStore>>,
}

impl ContextBuilder {
    /// Set the platform request id; a UUID is generated otherwise
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set the invocation deadline
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Enable response buffering for middleware interception
    pub fn buffered(mut self) -> Self {
        self.buffer = Some(ResponseBuffer::new());
        self
    }

    /// Inject the remote log pipeline handle
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Inject the metrics collector handle
    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Inject the connection store
    pub fn connections(mut self, store: Arc<dyn ConnectionStore>) -> Self {
        self.connections = Some(store);
        self
    }

    /// Assemble the context
    pub fn build(self) -> Context {
        let request_id = self
            .request_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let response = match &self.buffer {
            Some(buffer) => Response::new().with_buffer(buffer.clone()),
            None => Response::new(),
        };
        Context {
            inner: Arc::new(ContextInner {
                request: self.request,
                response: Mutex::new(response),
                values: RwLock::new(HashMap::new()),
                params: RwLock::new(HashMap::new()),
                claims: RwLock::new(Claims::default()),
                request_id,
                start: Instant::now(),
                start_time: Utc::now(),
                deadline: self.deadline,
                buffer: self.buffer,
                logger: self.logger,
                metrics: self.metrics,
                connections: self.connections,
            }),
        }
    }
}

impl Context {
    /// Start building a context for a normalized request
    pub fn builder(request: Request) -> ContextBuilder {
        ContextBuilder {
            request,
            request_id: None,
            deadline: None,
            buffer: None,
            logger: None,
            metrics: None,
            connections: None,
        }
    }

    /// Bare context, mostly for tests and simple handlers
    pub fn new(request: Request) -> Self {
        Self::builder(request).build()
    }

    // ------------------------------------------------------------------
    // Request side
    // ------------------------------------------------------------------

    /// The normalized request
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.request.header(name).map(str::to_string)
    }

    /// Query parameter lookup
    pub fn query(&self, name: &str) -> Option<String> {
        self.inner.request.query(name).map(str::to_string)
    }

    /// Path parameter bound by the router
    pub fn param(&self, name: &str) -> Option<String> {
        self.inner
            .params
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Bind path parameters; called by the HTTP router before the chain runs
    pub fn set_params(&self, params: HashMap<String, String>) {
        *self.inner.params.write().unwrap_or_else(|e| e.into_inner()) = params;
    }

    /// Snapshot of the bound path parameters
    pub fn params(&self) -> HashMap<String, String> {
        self.inner
            .params
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Deserialize the request body into `T`
    ///
    /// `EMPTY_BODY` when no body is present, `INVALID_JSON` on decode
    /// failure.
    pub fn bind_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let body = self
            .inner
            .request
            .body
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(LiftError::empty_body)?;
        serde_json::from_slice(body).map_err(|e| LiftError::invalid_json(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Ad-hoc values
    // ------------------------------------------------------------------

    /// Store an ad-hoc value for later middleware or the handler
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
    }

    /// Fetch an ad-hoc value
    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner
            .values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Fetch an ad-hoc string value
    pub fn value_str(&self, key: &str) -> Option<String> {
        self.value(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    /// Attach identity claims, marking the invocation authenticated
    ///
    /// Well-known fields are extracted into distinguished slots so
    /// tenant-scoping middleware can read them without reparsing:
    /// `user_id` (falling back to `sub`), `tenant_id`, `account_id`.
    pub fn set_claims(&self, claims: HashMap<String, Value>) {
        let as_string = |v: &Value| -> Option<String> { v.as_str().map(str::to_string) };
        let user_id = claims
            .get("user_id")
            .and_then(as_string)
            .or_else(|| claims.get("sub").and_then(as_string));
        let tenant_id = claims.get("tenant_id").and_then(as_string);
        let account_id = claims.get("account_id").and_then(as_string);

        let mut guard = self.inner.claims.write().unwrap_or_else(|e| e.into_inner());
        guard.claims = claims;
        guard.authenticated = true;
        guard.user_id = user_id;
        guard.tenant_id = tenant_id;
        guard.account_id = account_id;
    }

    /// Snapshot of the claims state
    pub fn claims(&self) -> Claims {
        self.inner
            .claims
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether `set_claims` has run
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .claims
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .authenticated
    }

    /// Authenticated user id, when known
    pub fn user_id(&self) -> Option<String> {
        self.inner
            .claims
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .user_id
            .clone()
    }

    /// Tenant scope, when known
    pub fn tenant_id(&self) -> Option<String> {
        self.inner
            .claims
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .tenant_id
            .clone()
    }

    // ------------------------------------------------------------------
    // Timing
    // ------------------------------------------------------------------

    /// Request correlation id
    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Wall-clock time when the context was created
    pub fn start_time(&self) -> DateTime<Utc> {
        self.inner.start_time
    }

    /// Elapsed time since context creation
    pub fn duration(&self) -> Duration {
        self.inner.start.elapsed()
    }

    /// Time left before the platform deadline, when one was provided
    pub fn remaining_time(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Run `fut` with a deadline
    ///
    /// The future runs on a spawned task; on expiry it keeps running in the
    /// background but its result is discarded and `TIMEOUT` is returned.
    pub async fn with_timeout<F, T>(&self, duration: Duration, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(fut);
        match tokio::time::timeout(duration, handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join_err)) => Err(LiftError::system(format!("task failed: {join_err}"))),
            Err(_) => Err(LiftError::timeout("operation timed out")),
        }
    }

    // ------------------------------------------------------------------
    // Response side
    // ------------------------------------------------------------------

    /// Run `f` with the response locked
    pub fn with_response<R>(&self, f: impl FnOnce(&mut Response) -> R) -> R {
        let mut guard = self
            .inner
            .response
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Set the response status
    pub fn status(&self, status_code: u16) {
        self.with_response(|r| {
            r.status(status_code);
        });
    }

    /// Set a response header
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.with_response(|r| {
            r.header(name, value);
        });
    }

    /// Write a JSON body
    pub fn json<T: Serialize>(&self, value: &T) -> Result<()> {
        self.with_response(|r| r.json(value))
    }

    /// Write a plain-text body
    pub fn text(&self, body: impl Into<String>) -> Result<()> {
        let body = body.into();
        self.with_response(|r| r.text(body))
    }

    /// Write an HTML body
    pub fn html(&self, body: impl Into<String>) -> Result<()> {
        let body = body.into();
        self.with_response(|r| r.html(body))
    }

    /// Write a binary body
    pub fn binary(&self, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.with_response(|r| r.binary(body, content_type))
    }

    /// Whether a body has been written
    pub fn is_written(&self) -> bool {
        self.with_response(|r| r.written)
    }

    /// Serialize the response to the platform envelope
    pub fn response_envelope(&self) -> Value {
        self.with_response(|r| r.to_envelope())
    }

    /// The interception buffer, when buffering is enabled
    pub fn response_buffer(&self) -> Option<&ResponseBuffer> {
        self.inner.buffer.as_ref()
    }

    // Status shortcuts: status + JSON body + written in one call.

    /// 200 with a JSON body
    pub fn ok<T: Serialize>(&self, value: &T) -> Result<()> {
        self.status(200);
        self.json(value)
    }

    /// 201 with a JSON body
    pub fn created<T: Serialize>(&self, value: &T) -> Result<()> {
        self.status(201);
        self.json(value)
    }

    /// 400 with an error body
    pub fn bad_request(&self, message: &str) -> Result<()> {
        self.status(400);
        self.json(&json!({"error": message, "status": 400}))
    }

    /// 401 with an error body
    pub fn unauthorized(&self, message: &str) -> Result<()> {
        self.status(401);
        self.json(&json!({"error": message, "status": 401}))
    }

    /// 403 with an error body
    pub fn forbidden(&self, message: &str) -> Result<()> {
        self.status(403);
        self.json(&json!({"error": message, "status": 403}))
    }

    /// 404 with an error body
    pub fn not_found(&self, message: &str) -> Result<()> {
        self.status(404);
        self.json(&json!({"error": message, "status": 404}))
    }

    /// 500 with an error body
    pub fn system_error(&self, message: &str) -> Result<()> {
        self.status(500);
        self.json(&json!({"error": message, "status": 500}))
    }

    // ------------------------------------------------------------------
    // Injected dependencies
    // ------------------------------------------------------------------

    /// Remote log pipeline handle, when injected
    pub fn logger(&self) -> Option<Logger> {
        self.inner
            .logger
            .as_ref()
            .map(|l| l.with_request_id(&self.inner.request_id))
    }

    /// Metrics collector handle, when injected
    pub fn metrics(&self) -> Option<MetricsCollector> {
        self.inner.metrics.clone()
    }

    /// Connection store, when injected
    pub fn connections(&self) -> Option<Arc<dyn ConnectionStore>> {
        self.inner.connections.clone()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.inner.request_id)
            .field("trigger_type", &self.inner.request.trigger_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::TriggerType;

    fn http_context(body: Option<&str>) -> Context {
        let mut request = Request::new(TriggerType::HttpV1);
        request.method = "POST".to_string();
        request.path = "/orders".to_string();
        request.body = body.map(|b| b.as_bytes().to_vec());
        Context::new(request)
    }

    #[test]
    fn values_roundtrip() {
        let ctx = http_context(None);
        ctx.set_value("traced", true);
        assert_eq!(ctx.value("traced"), Some(json!(true)));
        assert_eq!(ctx.value("missing"), None);
    }

    #[test]
    fn set_claims_extracts_well_known_fields() {
        let ctx = http_context(None);
        let mut claims = HashMap::new();
        claims.insert("sub".to_string(), json!("u-7"));
        claims.insert("tenant_id".to_string(), json!("t-3"));
        claims.insert("role".to_string(), json!("admin"));
        ctx.set_claims(claims);

        assert!(ctx.is_authenticated());
        assert_eq!(ctx.user_id().as_deref(), Some("u-7"));
        assert_eq!(ctx.tenant_id().as_deref(), Some("t-3"));
        assert_eq!(ctx.claims().claims["role"], json!("admin"));
    }

    #[test]
    fn user_id_prefers_explicit_over_sub() {
        let ctx = http_context(None);
        let mut claims = HashMap::new();
        claims.insert("user_id".to_string(), json!("explicit"));
        claims.insert("sub".to_string(), json!("fallback"));
        ctx.set_claims(claims);
        assert_eq!(ctx.user_id().as_deref(), Some("explicit"));
    }

    #[test]
    fn bind_json_rejects_empty_and_invalid_bodies() {
        let ctx = http_context(None);
        let err = ctx.bind_json::<serde_json::Value>().unwrap_err();
        assert!(err.is_code(crate::error::codes::EMPTY_BODY));

        let ctx = http_context(Some("{not json"));
        let err = ctx.bind_json::<serde_json::Value>().unwrap_err();
        assert!(err.is_code(crate::error::codes::INVALID_JSON));
    }

    #[test]
    fn status_shortcuts_write_once() {
        let ctx = http_context(None);
        ctx.ok(&json!({"fine": true})).unwrap();
        assert!(ctx.is_written());
        let err = ctx.bad_request("too late").unwrap_err();
        assert!(err.is_code(crate::error::codes::RESPONSE_WRITTEN));

        let envelope = ctx.response_envelope();
        assert_eq!(envelope["statusCode"], 200);
        assert_eq!(envelope["body"], r#"{"fine":true}"#);
    }

    #[test]
    fn buffered_context_snapshots_response() {
        let mut request = Request::new(TriggerType::HttpV2);
        request.method = "GET".to_string();
        let ctx = Context::builder(request).buffered().build();

        ctx.created(&json!({"id": 1})).unwrap();
        let snapshot = ctx.response_buffer().unwrap().snapshot();
        assert_eq!(snapshot.status_code, 201);
        assert_eq!(snapshot.body, ctx.response_envelope()["body"]);
    }

    #[tokio::test]
    async fn with_timeout_returns_result_before_deadline() {
        let ctx = http_context(None);
        let value = ctx
            .with_timeout(Duration::from_secs(1), async { 21 * 2 })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_expires_and_discards() {
        let ctx = http_context(None);
        let result = ctx
            .with_timeout(Duration::from_millis(50), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.is_code(crate::error::codes::TIMEOUT));
    }

    #[test]
    fn duration_reports_elapsed_time() {
        let ctx = http_context(None);
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctx.duration() >= Duration::from_millis(5));
    }

    #[test]
    fn params_bind_and_read() {
        let ctx = http_context(None);
        let mut params = HashMap::new();
        params.insert("id".to_string(), "123".to_string());
        ctx.set_params(params);
        assert_eq!(ctx.param("id").as_deref(), Some("123"));
    }
}
