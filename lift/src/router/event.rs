//! Pattern router for non-HTTP triggers
//!
//! Routes are grouped by trigger type. Dispatch selects the group for the
//! request's trigger, walks it in registration order, and calls the first
//! route whose pattern matches. Scheduled requests look in the event-bus
//! group (registered via `EventBridge`), and event-bus envelopes whose
//! source is `aws.s3` are additionally matched against the object-store
//! group using the bucket and key from the event detail (cross-trigger
//! fan-in).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::pattern::{object_store_match, wildcard_match};
use crate::context::Context;
use crate::error::{LiftError, Result};
use crate::handler::{compose, Handler, Middleware};
use crate::request::{Request, TriggerType};

struct EventRoute {
    pattern: String,
    handler: Arc<dyn Handler>,
}

/// Route-index entry returned by [`EventRouter::routes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRouteInfo {
    pub trigger_type: TriggerType,
    pub pattern: String,
}

/// Router for queue, object-store, event-bus and scheduled triggers
#[derive(Default)]
pub struct EventRouter {
    groups: RwLock<HashMap<TriggerType, Vec<EventRoute>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern route for a trigger type
    pub fn add(&self, trigger_type: TriggerType, pattern: &str, handler: Arc<dyn Handler>) {
        self.groups
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(trigger_type)
            .or_default()
            .push(EventRoute {
                pattern: pattern.to_string(),
                handler,
            });
    }

    /// Install the application middleware chain
    pub fn set_middleware(&self, middleware: Vec<Arc<dyn Middleware>>) {
        *self.middleware.write().unwrap_or_else(|e| e.into_inner()) = middleware;
    }

    /// Defensive copy of the route index
    ///
    /// The returned vectors share nothing with the router's own storage;
    /// mutating them cannot affect dispatch.
    pub fn routes(&self) -> HashMap<TriggerType, Vec<EventRouteInfo>> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups
            .iter()
            .map(|(trigger, routes)| {
                (
                    *trigger,
                    routes
                        .iter()
                        .map(|r| EventRouteInfo {
                            trigger_type: *trigger,
                            pattern: r.pattern.clone(),
                        })
                        .collect(),
                )
            })
            .collect()
    }

    /// Resolve the first matching handler for a normalized request
    pub fn find(&self, request: &Request) -> Option<Arc<dyn Handler>> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());

        // Event-bus envelopes carrying object-store notifications may still
        // select object-store handlers.
        if request.trigger_type == TriggerType::EventBus
            && request.source.as_deref() == Some("aws.s3")
        {
            if let Some(routes) = groups.get(&TriggerType::ObjectStore) {
                let bucket = request
                    .detail
                    .pointer("/bucket/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let key = request
                    .detail
                    .pointer("/object/key")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                for route in routes {
                    if object_store_match(&route.pattern, bucket, key) {
                        return Some(route.handler.clone());
                    }
                }
            }
        }

        // Scheduled rules are registered through the event-bus surface.
        let group_key = match request.trigger_type {
            TriggerType::Scheduled => TriggerType::EventBus,
            other => other,
        };
        let routes = groups.get(&group_key)?;

        for route in routes {
            if Self::matches(request, &route.pattern) {
                return Some(route.handler.clone());
            }
        }
        None
    }

    fn matches(request: &Request, pattern: &str) -> bool {
        match request.trigger_type {
            TriggerType::Queue => {
                let arn = request
                    .records
                    .first()
                    .and_then(|r| r.get("eventSourceARN"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                arn.contains(pattern) || arn.ends_with(&format!(":{pattern}"))
            }
            TriggerType::ObjectStore => {
                let first = request.records.first();
                let bucket = first
                    .and_then(|r| r.pointer("/s3/bucket/name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let key = first
                    .and_then(|r| r.pointer("/s3/object/key"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                object_store_match(pattern, bucket, key)
            }
            TriggerType::Scheduled => {
                // Rule name is the suffix of the first resource ARN:
                // arn:aws:events:...:rule/<name>
                let rule = request
                    .raw_event
                    .get("resources")
                    .and_then(Value::as_array)
                    .and_then(|r| r.first())
                    .and_then(Value::as_str)
                    .and_then(|arn| arn.rsplit_once("rule/").map(|(_, name)| name))
                    .unwrap_or_default();
                wildcard_match(pattern, rule)
            }
            TriggerType::EventBus => {
                wildcard_match(pattern, request.source.as_deref().unwrap_or_default())
            }
            _ => false,
        }
    }

    /// Route and run the composed chain for this invocation
    pub async fn handle(&self, ctx: Context) -> Result<()> {
        let request = ctx.request();
        let handler = self.find(request).ok_or_else(|| {
            LiftError::not_found(format!(
                "no event route for trigger {}",
                request.trigger_type
            ))
        })?;

        let chain = {
            let middleware = self.middleware.read().unwrap_or_else(|e| e.into_inner());
            compose(&middleware, handler)
        };
        chain.call(ctx).await
    }
}
