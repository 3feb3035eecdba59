//! Normalized request produced by the event adapters
//!
//! One [`Request`] shape covers every trigger class. Adapters populate the
//! fields relevant to their envelope and leave the rest at their defaults;
//! `headers` and `query_params` are always present (empty rather than
//! absent), and header lookup is case-insensitive.

use std::collections::HashMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

/// The class of event that invoked the function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerType {
    /// API Gateway REST proxy (payload format 1.0)
    HttpV1,
    /// API Gateway HTTP API proxy (payload format 2.0)
    HttpV2,
    /// API Gateway WebSocket route event
    WebSocket,
    /// SQS queue batch
    Queue,
    /// S3 object notification batch
    ObjectStore,
    /// EventBridge message
    EventBus,
    /// EventBridge scheduled rule
    Scheduled,
    /// Unrecognized envelope
    Unknown,
}

impl TriggerType {
    /// Stable lowercase name used in logs and metrics dimensions
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpV1 => "http_v1",
            Self::HttpV2 => "http_v2",
            Self::WebSocket => "websocket",
            Self::Queue => "queue",
            Self::ObjectStore => "object_store",
            Self::EventBus => "event_bus",
            Self::Scheduled => "scheduled",
            Self::Unknown => "unknown",
        }
    }

    /// True for both HTTP proxy payload formats
    pub fn is_http(&self) -> bool {
        matches!(self, Self::HttpV1 | Self::HttpV2)
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized request, uniform across trigger classes
#[derive(Debug, Clone)]
pub struct Request {
    /// Trigger class; exactly one is set by the producing adapter
    pub trigger_type: TriggerType,

    // HTTP fields
    /// HTTP method (`GET`, `POST`, ...); empty for non-HTTP triggers
    pub method: String,
    /// Request path; empty for non-HTTP triggers
    pub path: String,
    /// Case-insensitive headers; never absent
    pub headers: HeaderMap,
    /// Query string parameters; never absent
    pub query_params: HashMap<String, String>,
    /// Path parameters bound by the router
    pub path_params: HashMap<String, String>,
    /// Raw body bytes, base64-decoded when the envelope flagged it
    pub body: Option<Vec<u8>>,

    // Batch fields
    /// Ordered raw record maps for queue and object-store batches
    pub records: Vec<Value>,

    // Event-bus fields
    /// Event source (`aws.s3`, `my.app`, ...)
    pub source: Option<String>,
    /// Event detail-type
    pub detail_type: Option<String>,
    /// Event detail payload
    pub detail: Value,
    /// Event id assigned by the bus
    pub event_id: Option<String>,
    /// Event timestamp as delivered by the bus
    pub timestamp: Option<String>,

    /// Adapter-specific side channel (WS connection id, route key, stage, ...)
    pub metadata: HashMap<String, String>,
    /// Original envelope, retained for passthrough access
    pub raw_event: Value,
}

impl Request {
    /// Create an empty request for the given trigger class
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            method: String::new(),
            path: String::new(),
            headers: HeaderMap::new(),
            query_params: HashMap::new(),
            path_params: HashMap::new(),
            body: None,
            records: Vec::new(),
            source: None,
            detail_type: None,
            detail: Value::Null,
            event_id: None,
            timestamp: None,
            metadata: HashMap::new(),
            raw_event: Value::Null,
        }
    }

    /// Look up a header case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Insert a header, ignoring names or values the HTTP grammar rejects
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
    }

    /// Look up a query parameter
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Look up a path parameter bound by the router
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Metadata side-channel lookup
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Body interpreted as UTF-8, when present and valid
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}
