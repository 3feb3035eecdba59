//! WebSocket route-event adapter

use serde_json::Value;

use super::{str_field, EventAdapter};
use crate::error::{LiftError, Result};
use crate::request::{Request, TriggerType};

/// API Gateway WebSocket route events
///
/// The connection id, route key and management endpoint travel in the
/// request metadata; the WebSocket router and [`crate::ws::WsContext`] read
/// them from there.
pub struct WebSocketAdapter;

impl WebSocketAdapter {
    fn request_context(raw: &Value) -> Option<&Value> {
        raw.get("requestContext")
    }
}

impl EventAdapter for WebSocketAdapter {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::WebSocket
    }

    fn can_handle(&self, raw: &Value) -> bool {
        match Self::request_context(raw) {
            Some(ctx) => {
                ctx.get("routeKey").and_then(Value::as_str).is_some()
                    && ctx.get("connectionId").and_then(Value::as_str).is_some()
            }
            None => false,
        }
    }

    fn adapt(&self, raw: Value) -> Result<Request> {
        self.validate(&raw)?;
        let mut request = Request::new(TriggerType::WebSocket);

        let ctx = Self::request_context(&raw).cloned().unwrap_or(Value::Null);
        for key in ["connectionId", "routeKey", "eventType", "stage", "domainName", "requestId", "apiId"] {
            if let Some(value) = str_field(&ctx, key) {
                request.metadata.insert(key.to_string(), value);
            }
        }

        if let (Some(domain), Some(stage)) =
            (str_field(&ctx, "domainName"), str_field(&ctx, "stage"))
        {
            request
                .metadata
                .insert("managementEndpoint".to_string(), format!("https://{domain}/{stage}"));
        }

        if let Some(body) = raw.get("body").and_then(Value::as_str) {
            request.body = Some(body.as_bytes().to_vec());
        }

        request.raw_event = raw;
        Ok(request)
    }

    fn validate(&self, raw: &Value) -> Result<()> {
        let ctx = Self::request_context(raw)
            .ok_or_else(|| LiftError::validation("requestContext is required"))?;
        if ctx.get("routeKey").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("requestContext.routeKey is required"));
        }
        if ctx.get("connectionId").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("requestContext.connectionId is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connect_envelope() -> Value {
        json!({
            "requestContext": {
                "routeKey": "$connect",
                "connectionId": "abc123",
                "eventType": "CONNECT",
                "stage": "prod",
                "domainName": "ws.example.com",
                "requestId": "r-9",
                "apiId": "api-1",
            },
        })
    }

    #[test]
    fn metadata_carries_connection_details() {
        let request = WebSocketAdapter.adapt(connect_envelope()).unwrap();
        assert_eq!(request.meta("connectionId"), Some("abc123"));
        assert_eq!(request.meta("routeKey"), Some("$connect"));
        assert_eq!(request.meta("eventType"), Some("CONNECT"));
        assert_eq!(request.meta("stage"), Some("prod"));
        assert_eq!(
            request.meta("managementEndpoint"),
            Some("https://ws.example.com/prod")
        );
    }

    #[test]
    fn message_body_is_preserved() {
        let mut raw = connect_envelope();
        raw["requestContext"]["routeKey"] = json!("sendMessage");
        raw["body"] = json!(r#"{"action": "ping"}"#);
        let request = WebSocketAdapter.adapt(raw).unwrap();
        assert_eq!(request.body_str(), Some(r#"{"action": "ping"}"#));
    }

    #[test]
    fn rejects_envelopes_without_connection_id() {
        let raw = json!({"requestContext": {"routeKey": "$connect"}});
        assert!(!WebSocketAdapter.can_handle(&raw));
        assert!(WebSocketAdapter.validate(&raw).is_err());
    }

    #[test]
    fn does_not_claim_http_envelopes() {
        let raw = json!({"httpMethod": "GET", "path": "/x", "requestContext": {"requestId": "r"}});
        assert!(!WebSocketAdapter.can_handle(&raw));
    }
}
