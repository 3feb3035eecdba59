//! Event-adapter registry: detection and normalization of raw envelopes
//!
//! Each trigger class has one adapter that recognizes its envelope shape and
//! normalizes it into a [`Request`]. Detection scans adapters in
//! registration order and the first match wins, so adapters must be
//! conservative: a bare `Records` array is only claimed when the first
//! record's `eventSource` matches, and HTTP-v2 requires both the
//! `requestContext.http` object and the `version == "2.0"` discriminator.

mod event_bus;
mod http;
mod records;
mod websocket;

pub use event_bus::EventBusAdapter;
pub use http::{HttpV1Adapter, HttpV2Adapter};
pub use records::{ObjectStoreAdapter, QueueAdapter};
pub use websocket::WebSocketAdapter;

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{LiftError, Result};
use crate::request::{Request, TriggerType};

/// Recognizes and normalizes one envelope class
pub trait EventAdapter: Send + Sync {
    /// The trigger class this adapter produces
    fn trigger_type(&self) -> TriggerType;

    /// Cheap structural check; must not false-positive on other classes
    fn can_handle(&self, raw: &Value) -> bool;

    /// Normalize the envelope into a request
    fn adapt(&self, raw: Value) -> Result<Request>;

    /// Structural validation, stricter than `can_handle`
    fn validate(&self, raw: &Value) -> Result<()>;
}

/// Ordered adapter collection
///
/// Constructed once at process init and treated as read-only afterwards; the
/// shared default lives behind [`default_registry`].
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn EventAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry with the built-in adapters in their canonical order
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HttpV2Adapter));
        registry.register(Arc::new(HttpV1Adapter));
        registry.register(Arc::new(WebSocketAdapter));
        registry.register(Arc::new(QueueAdapter));
        registry.register(Arc::new(ObjectStoreAdapter));
        registry.register(Arc::new(EventBusAdapter));
        registry
    }

    /// Append an adapter; earlier registrations are tried first
    pub fn register(&mut self, adapter: Arc<dyn EventAdapter>) {
        self.adapters.push(adapter);
    }

    /// Detect the envelope class and normalize it
    ///
    /// Scans in registration order; the first adapter whose `can_handle`
    /// accepts the envelope adapts it. `UNKNOWN_EVENT` when nothing matches.
    pub fn detect(&self, raw: Value) -> Result<Request> {
        for adapter in &self.adapters {
            if adapter.can_handle(&raw) {
                return adapter.adapt(raw);
            }
        }
        Err(LiftError::unknown_event())
    }

    /// Number of registered adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// True when no adapters are registered
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

static DEFAULT_REGISTRY: Lazy<Arc<AdapterRegistry>> =
    Lazy::new(|| Arc::new(AdapterRegistry::with_defaults()));

/// Process-wide default registry, built on first use
pub fn default_registry() -> Arc<AdapterRegistry> {
    DEFAULT_REGISTRY.clone()
}

// Shared helpers for the adapter implementations.

pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn string_map(value: Option<&Value>) -> Vec<(String, String)> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}
