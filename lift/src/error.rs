//! Structured error type with stable machine codes and HTTP surfacing
//!
//! Every fallible operation in the crate returns [`LiftError`]. The error
//! carries a stable `code` string for machines, an optional HTTP status for
//! the network boundary, a chainable cause, and observability fields that
//! middleware fills in as the error bubbles up. Rendering for the wire goes
//! through [`LiftError::to_response_body`], which sanitizes detail fields.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::sanitize::{sanitize_error_message, sanitize_field_value};

/// Result type alias using the framework error
pub type Result<T> = std::result::Result<T, LiftError>;

// Stable machine codes. Kept as consts so call sites and tests share one
// spelling.
pub mod codes {
    pub const PARAMETER_ERROR: &str = "PARAMETER_ERROR";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INVALID_JSON: &str = "INVALID_JSON";
    pub const EMPTY_BODY: &str = "EMPTY_BODY";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const AUTHORIZATION_ERROR: &str = "AUTHORIZATION_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const ROUTE_NOT_FOUND: &str = "ROUTE_NOT_FOUND";
    pub const WEBSOCKET_ROUTE_NOT_FOUND: &str = "WEBSOCKET_ROUTE_NOT_FOUND";
    pub const RESPONSE_WRITTEN: &str = "RESPONSE_WRITTEN";
    pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";
    pub const POOL_EXHAUSTED: &str = "POOL_EXHAUSTED";
    pub const POOL_CLOSED: &str = "POOL_CLOSED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CONNECTION_GONE: &str = "CONNECTION_GONE";
    pub const SYSTEM_ERROR: &str = "SYSTEM_ERROR";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const PROCESSING_ERROR: &str = "PROCESSING_ERROR";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
}

/// Structured framework error
///
/// Cheap to construct on the happy-error path; the `details` map and cause
/// chain are only allocated when used.
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct LiftError {
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// HTTP status used when the error reaches the network boundary
    pub status_code: Option<u16>,
    /// Wrapped cause, chainable through `std::error::Error::source`
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    /// Additional structured context; sanitized before egress
    pub details: HashMap<String, Value>,
    /// Request correlation id, filled in by middleware
    pub request_id: Option<String>,
    /// Trace correlation id, filled in by middleware
    pub trace_id: Option<String>,
    /// When the error was created
    pub timestamp: DateTime<Utc>,
    /// Captured stack description for panics and system failures
    pub stack: Option<String>,
}

impl LiftError {
    /// Create an error with an explicit code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status_code: None,
            cause: None,
            details: HashMap::new(),
            request_id: None,
            trace_id: None,
            timestamp: Utc::now(),
            stack: None,
        }
    }

    fn with_status(code: &str, message: impl Into<String>, status: u16) -> Self {
        let mut err = Self::new(code, message);
        err.status_code = Some(status);
        err
    }

    // ------------------------------------------------------------------
    // Category constructors
    // ------------------------------------------------------------------

    /// Invalid request parameter (400)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_status(codes::PARAMETER_ERROR, message, 400)
    }

    /// Semantic validation failure (422)
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::with_status(codes::VALIDATION_ERROR, message, 422)
    }

    /// Malformed JSON body (400)
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::with_status(codes::INVALID_JSON, message, 400)
    }

    /// Missing request body where one was required (400)
    pub fn empty_body() -> Self {
        Self::with_status(codes::EMPTY_BODY, "request body is required", 400)
    }

    /// Authentication failure (401)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::with_status(codes::UNAUTHORIZED, message, 401)
    }

    /// Authorization denied (403)
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::with_status(codes::AUTHORIZATION_ERROR, message, 403)
    }

    /// Resource not found (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(codes::NOT_FOUND, message, 404)
    }

    /// Resource conflict (409)
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_status(codes::CONFLICT, message, 409)
    }

    /// Unexpected internal failure (500)
    pub fn system(message: impl Into<String>) -> Self {
        Self::with_status(codes::SYSTEM_ERROR, message, 500)
    }

    /// Network-level failure talking to a collaborator
    pub fn network(message: impl Into<String>) -> Self {
        Self::with_status(codes::NETWORK_ERROR, message, 502)
    }

    /// Failure while processing a batch record or event payload
    pub fn processing(message: impl Into<String>) -> Self {
        Self::with_status(codes::PROCESSING_ERROR, message, 500)
    }

    /// No HTTP route matched (404)
    pub fn route_not_found(method: &str, path: &str) -> Self {
        Self::with_status(
            codes::ROUTE_NOT_FOUND,
            format!("no route for {method} {path}"),
            404,
        )
    }

    /// No WebSocket route matched (404)
    pub fn websocket_route_not_found(route_key: &str) -> Self {
        Self::with_status(
            codes::WEBSOCKET_ROUTE_NOT_FOUND,
            format!("no handler for route key {route_key}"),
            404,
        )
    }

    /// Response body was already written (500)
    pub fn response_written() -> Self {
        Self::with_status(codes::RESPONSE_WRITTEN, "response already written", 500)
    }

    /// No adapter recognized the raw envelope
    pub fn unknown_event() -> Self {
        Self::with_status(codes::UNKNOWN_EVENT, "unrecognized event envelope", 500)
    }

    /// Pool has no capacity left (503 at the HTTP boundary)
    pub fn pool_exhausted(pool: &str) -> Self {
        Self::with_status(codes::POOL_EXHAUSTED, format!("pool {pool} exhausted"), 503)
    }

    /// Pool is closed (503 at the HTTP boundary)
    pub fn pool_closed(pool: &str) -> Self {
        Self::with_status(codes::POOL_CLOSED, format!("pool {pool} is closed"), 503)
    }

    /// Deadline exceeded
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_status(codes::TIMEOUT, message, 504)
    }

    /// The WebSocket peer is gone (management API returned 410)
    pub fn connection_gone(connection_id: &str) -> Self {
        Self::with_status(
            codes::CONNECTION_GONE,
            format!("connection {connection_id} is gone"),
            410,
        )
    }

    /// Configuration loading failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::with_status(codes::CONFIG_ERROR, message, 500)
    }

    // ------------------------------------------------------------------
    // Fluent enrichment
    // ------------------------------------------------------------------

    /// Attach a structured detail field
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach the request correlation id
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach the trace correlation id
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Wrap an underlying error as the cause
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Record a captured stack description
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// True when the code matches
    pub fn is_code(&self, code: &str) -> bool {
        self.code == code
    }

    /// HTTP status for the network boundary, defaulting to 500
    pub fn status(&self) -> u16 {
        self.status_code.unwrap_or(500)
    }

    /// Render the sanitized JSON body surfaced to callers
    ///
    /// Shape: `{code, message, details?}`. Detail values run through the
    /// same sanitization rules the log pipeline applies.
    pub fn to_response_body(&self) -> Value {
        let mut body = json!({
            "code": self.code,
            "message": sanitize_error_message(&self.message),
        });
        if !self.details.is_empty() {
            let details: serde_json::Map<String, Value> = self
                .details
                .iter()
                .map(|(k, v)| (k.clone(), sanitize_field_value(k, v)))
                .collect();
            body["details"] = Value::Object(details);
        }
        body
    }
}

impl From<serde_json::Error> for LiftError {
    fn from(err: serde_json::Error) -> Self {
        LiftError::invalid_json(err.to_string())
    }
}

impl From<reqwest::Error> for LiftError {
    fn from(err: reqwest::Error) -> Self {
        LiftError::network(err.to_string()).with_cause(err)
    }
}

impl From<figment::Error> for LiftError {
    fn from(err: figment::Error) -> Self {
        LiftError::config(err.to_string())
    }
}

impl From<anyhow::Error> for LiftError {
    fn from(err: anyhow::Error) -> Self {
        LiftError::system(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_constructors_set_code_and_status() {
        assert_eq!(LiftError::validation("bad id").code, codes::PARAMETER_ERROR);
        assert_eq!(LiftError::validation("bad id").status(), 400);
        assert_eq!(LiftError::unauthorized("no token").status(), 401);
        assert_eq!(LiftError::authorization("denied").status(), 403);
        assert_eq!(LiftError::not_found("missing").status(), 404);
        assert_eq!(LiftError::conflict("dup").status(), 409);
        assert_eq!(LiftError::validation_failed("bad email").status(), 422);
        assert_eq!(LiftError::system("boom").status(), 500);
        assert_eq!(LiftError::pool_exhausted("db").status(), 503);
    }

    #[test]
    fn status_defaults_to_500() {
        let err = LiftError::new("CUSTOM", "something");
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn cause_chain_is_reachable_via_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = LiftError::system("wrapper").with_cause(io);
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("disk on fire"));
    }

    #[test]
    fn response_body_contains_code_message_details() {
        let err = LiftError::validation("id must be numeric").with_detail("field", "id");
        let body = err.to_response_body();
        assert_eq!(body["code"], "PARAMETER_ERROR");
        assert_eq!(body["message"], "id must be numeric");
        assert_eq!(body["details"]["field"], "id");
    }

    #[test]
    fn response_body_redacts_sensitive_details() {
        let err = LiftError::system("boom").with_detail("api_key", "sk-12345");
        let body = err.to_response_body();
        assert_eq!(body["details"]["api_key"], "[REDACTED]");
    }

    #[test]
    fn response_body_sanitizes_leaky_messages() {
        let err = LiftError::system("postgres://admin:pw@db:5432 refused");
        let body = err.to_response_body();
        assert_eq!(body["message"], "[SANITIZED_ERROR]");
    }

    #[test]
    fn display_includes_code() {
        let err = LiftError::not_found("user 42");
        assert_eq!(err.to_string(), "[NOT_FOUND] user 42");
    }
}
