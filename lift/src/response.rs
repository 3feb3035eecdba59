//! Buffered response value and platform envelope serialization
//!
//! A [`Response`] accumulates status, headers and exactly one body write.
//! The `written` flag is one-way: a second body write fails with
//! `RESPONSE_WRITTEN`, though the status may still be amended until the
//! envelope is serialized. When interception is enabled, every mutation is
//! mirrored into a mutex-guarded [`ResponseBuffer`] so middleware can inspect
//! the final payload after the handler returns without re-serializing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{LiftError, Result};

/// Response body payload
#[derive(Debug, Clone)]
pub enum ResponseBody {
    /// Pass-through text
    Text(String),
    /// Binary payload, base64-encoded in the envelope
    Binary(Vec<u8>),
    /// JSON value, encoded at serialization time
    Json(Value),
}

/// Snapshot of the response visible to intercepting middleware
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    /// Serialized body exactly as the envelope will carry it
    pub body: String,
    /// Status code at the time of the last write
    pub status_code: u16,
    /// Headers at the time of the last write
    pub headers: HashMap<String, String>,
}

/// Shared, mutex-guarded response snapshot
///
/// Opt-in: mirroring doubles the write cost, so the application shell only
/// attaches a buffer when some registered middleware asks for interception.
#[derive(Debug, Clone, Default)]
pub struct ResponseBuffer {
    inner: Arc<Mutex<BufferedResponse>>,
}

impl ResponseBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn capture(&self, status_code: u16, headers: &HashMap<String, String>, body: String) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.status_code = status_code;
        guard.headers = headers.clone();
        guard.body = body;
    }

    fn capture_status(&self, status_code: u16) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.status_code = status_code;
    }

    /// Current snapshot
    pub fn snapshot(&self) -> BufferedResponse {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Outgoing response under construction
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status surfaced in the envelope
    pub status_code: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Body payload, set at most once
    pub body: Option<ResponseBody>,
    /// Whether the envelope body is base64-encoded binary
    pub is_base64: bool,
    /// One-way flag: a body has been written
    pub written: bool,
    buffer: Option<ResponseBuffer>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Create an empty 200 response
    pub fn new() -> Self {
        Self {
            status_code: 200,
            headers: HashMap::new(),
            body: None,
            is_base64: false,
            written: false,
            buffer: None,
        }
    }

    /// Attach an interception buffer; subsequent writes are mirrored into it
    pub fn with_buffer(mut self, buffer: ResponseBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Set the status code
    ///
    /// Allowed even after the body is written; the envelope picks up the
    /// final value.
    pub fn status(&mut self, status_code: u16) -> &mut Self {
        self.status_code = status_code;
        if let Some(buffer) = &self.buffer {
            buffer.capture_status(status_code);
        }
        self
    }

    /// Set a response header
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn write_body(&mut self, body: ResponseBody, is_base64: bool) -> Result<()> {
        if self.written {
            return Err(LiftError::response_written());
        }
        self.body = Some(body);
        self.is_base64 = is_base64;
        self.written = true;
        if let Some(buffer) = self.buffer.clone() {
            buffer.capture(self.status_code, &self.headers, self.body_string());
        }
        Ok(())
    }

    /// Serialize `value` as the JSON body and set the content type
    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)?;
        self.header("Content-Type", "application/json");
        self.write_body(ResponseBody::Json(encoded), false)
    }

    /// Set a plain-text body
    pub fn text(&mut self, body: impl Into<String>) -> Result<()> {
        self.header("Content-Type", "text/plain; charset=utf-8");
        self.write_body(ResponseBody::Text(body.into()), false)
    }

    /// Set an HTML body
    pub fn html(&mut self, body: impl Into<String>) -> Result<()> {
        self.header("Content-Type", "text/html; charset=utf-8");
        self.write_body(ResponseBody::Text(body.into()), false)
    }

    /// Set a binary body, carried base64-encoded in the envelope
    pub fn binary(&mut self, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.header("Content-Type", content_type);
        self.write_body(ResponseBody::Binary(body), true)
    }

    /// Body rendered to the string form the envelope carries
    pub fn body_string(&self) -> String {
        match &self.body {
            None => String::new(),
            Some(ResponseBody::Text(s)) => s.clone(),
            Some(ResponseBody::Binary(b)) => BASE64.encode(b),
            Some(ResponseBody::Json(v)) => v.to_string(),
        }
    }

    /// Serialize to the platform response envelope
    ///
    /// All trigger classes share the shape
    /// `{statusCode, headers, body, isBase64Encoded}`.
    pub fn to_envelope(&self) -> Value {
        json!({
            "statusCode": self.status_code,
            "headers": self.headers,
            "body": self.body_string(),
            "isBase64Encoded": self.is_base64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn default_status_is_200() {
        let resp = Response::new();
        assert_eq!(resp.status_code, 200);
        assert!(!resp.written);
    }

    #[test]
    fn json_sets_content_type_and_written() {
        let mut resp = Response::new();
        resp.json(&json!({"ok": true})).unwrap();
        assert!(resp.written);
        assert_eq!(
            resp.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(resp.body_string(), r#"{"ok":true}"#);
    }

    #[test]
    fn second_body_write_fails() {
        let mut resp = Response::new();
        resp.text("first").unwrap();
        let err = resp.text("second").unwrap_err();
        assert!(err.is_code(codes::RESPONSE_WRITTEN));
        assert_eq!(resp.body_string(), "first");
    }

    #[test]
    fn status_may_be_amended_after_write() {
        let mut resp = Response::new();
        resp.json(&json!({"ok": true})).unwrap();
        resp.status(201);
        assert_eq!(resp.to_envelope()["statusCode"], 201);
    }

    #[test]
    fn binary_sets_base64_flag() {
        let mut resp = Response::new();
        resp.binary(vec![0xde, 0xad], "application/octet-stream").unwrap();
        assert!(resp.is_base64);
        let envelope = resp.to_envelope();
        assert_eq!(envelope["isBase64Encoded"], true);
        assert_eq!(envelope["body"], BASE64.encode([0xde, 0xad]));
    }

    #[test]
    fn envelope_has_all_top_level_fields() {
        let mut resp = Response::new();
        resp.status(404);
        resp.text("missing").unwrap();
        let envelope = resp.to_envelope();
        assert_eq!(envelope["statusCode"], 404);
        assert_eq!(envelope["body"], "missing");
        assert_eq!(envelope["isBase64Encoded"], false);
        assert!(envelope["headers"].is_object());
    }

    #[test]
    fn buffer_sees_final_payload() {
        let buffer = ResponseBuffer::new();
        let mut resp = Response::new().with_buffer(buffer.clone());
        resp.status(201);
        resp.json(&json!({"id": 7})).unwrap();

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.status_code, 201);
        assert_eq!(snapshot.body, r#"{"id":7}"#);
        assert_eq!(
            snapshot.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        // Buffer and serializer agree.
        assert_eq!(snapshot.body, resp.body_string());
    }

    #[test]
    fn status_amendment_after_write_reaches_buffer() {
        let buffer = ResponseBuffer::new();
        let mut resp = Response::new().with_buffer(buffer.clone());
        resp.text("done").unwrap();
        resp.status(202);
        assert_eq!(buffer.snapshot().status_code, 202);
    }
}
