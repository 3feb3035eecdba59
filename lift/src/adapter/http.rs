//! HTTP proxy adapters for the v1 (REST) and v2 (HTTP API) payload formats

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use super::{str_field, string_map, EventAdapter};
use crate::error::{LiftError, Result};
use crate::request::{Request, TriggerType};

fn decode_body(raw: &Value) -> Result<Option<Vec<u8>>> {
    let body = match raw.get("body").and_then(Value::as_str) {
        Some(body) => body,
        None => return Ok(None),
    };
    let is_base64 = raw
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if is_base64 {
        let decoded = BASE64
            .decode(body)
            .map_err(|e| LiftError::validation(format!("invalid base64 body: {e}")))?;
        Ok(Some(decoded))
    } else {
        Ok(Some(body.as_bytes().to_vec()))
    }
}

/// API Gateway REST proxy, payload format 1.0
pub struct HttpV1Adapter;

impl EventAdapter for HttpV1Adapter {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::HttpV1
    }

    fn can_handle(&self, raw: &Value) -> bool {
        raw.get("httpMethod").and_then(Value::as_str).is_some()
    }

    fn adapt(&self, raw: Value) -> Result<Request> {
        self.validate(&raw)?;
        let mut request = Request::new(TriggerType::HttpV1);
        request.method = str_field(&raw, "httpMethod").unwrap_or_default();
        request.path = str_field(&raw, "path").unwrap_or_default();

        // Multi-valued headers first (last value of each list wins), then
        // the single-valued map overrides on collision.
        if let Some(Value::Object(multi)) = raw.get("multiValueHeaders") {
            for (name, values) in multi {
                if let Some(last) = values.as_array().and_then(|v| v.last()).and_then(Value::as_str)
                {
                    request.set_header(name, last);
                }
            }
        }
        for (name, value) in string_map(raw.get("headers")) {
            request.set_header(&name, &value);
        }

        if let Some(Value::Object(multi)) = raw.get("multiValueQueryStringParameters") {
            for (name, values) in multi {
                if let Some(last) = values.as_array().and_then(|v| v.last()).and_then(Value::as_str)
                {
                    request.query_params.insert(name.clone(), last.to_string());
                }
            }
        }
        for (name, value) in string_map(raw.get("queryStringParameters")) {
            request.query_params.insert(name, value);
        }

        for (name, value) in string_map(raw.get("pathParameters")) {
            request.path_params.insert(name, value);
        }

        request.body = decode_body(&raw)?;

        if let Some(request_id) = raw
            .get("requestContext")
            .and_then(|c| str_field(c, "requestId"))
        {
            request.metadata.insert("requestId".to_string(), request_id);
        }
        if let Some(resource) = str_field(&raw, "resource") {
            request.metadata.insert("resource".to_string(), resource);
        }

        request.raw_event = raw;
        Ok(request)
    }

    fn validate(&self, raw: &Value) -> Result<()> {
        if raw.get("httpMethod").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("httpMethod is required"));
        }
        if raw.get("path").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("path is required"));
        }
        Ok(())
    }
}

/// API Gateway HTTP API proxy, payload format 2.0
pub struct HttpV2Adapter;

impl HttpV2Adapter {
    fn http_context(raw: &Value) -> Option<&Value> {
        raw.get("requestContext").and_then(|c| c.get("http"))
    }
}

impl EventAdapter for HttpV2Adapter {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::HttpV2
    }

    fn can_handle(&self, raw: &Value) -> bool {
        // Both discriminators are required; `version` alone shows up in
        // unrelated envelopes.
        let versioned = raw.get("version").and_then(Value::as_str) == Some("2.0");
        versioned && Self::http_context(raw).map(Value::is_object).unwrap_or(false)
    }

    fn adapt(&self, raw: Value) -> Result<Request> {
        self.validate(&raw)?;
        let mut request = Request::new(TriggerType::HttpV2);

        let http = Self::http_context(&raw).cloned().unwrap_or(Value::Null);
        request.method = str_field(&http, "method").unwrap_or_default();
        request.path = str_field(&http, "path")
            .or_else(|| str_field(&raw, "rawPath"))
            .unwrap_or_default();

        for (name, value) in string_map(raw.get("headers")) {
            request.set_header(&name, &value);
        }
        for (name, value) in string_map(raw.get("queryStringParameters")) {
            request.query_params.insert(name, value);
        }
        for (name, value) in string_map(raw.get("pathParameters")) {
            request.path_params.insert(name, value);
        }

        request.body = decode_body(&raw)?;

        if let Some(request_id) = raw
            .get("requestContext")
            .and_then(|c| str_field(c, "requestId"))
        {
            request.metadata.insert("requestId".to_string(), request_id);
        }

        request.raw_event = raw;
        Ok(request)
    }

    fn validate(&self, raw: &Value) -> Result<()> {
        if raw.get("version").and_then(Value::as_str) != Some("2.0") {
            return Err(LiftError::validation("version 2.0 is required"));
        }
        let http = Self::http_context(raw).ok_or_else(|| {
            LiftError::validation("requestContext.http is required")
        })?;
        if http.get("method").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("requestContext.http.method is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v1_merges_headers_with_single_valued_winning() {
        let raw = json!({
            "httpMethod": "GET",
            "path": "/t",
            "headers": {"X-Mixed": "single"},
            "multiValueHeaders": {
                "X-Mixed": ["first", "second"],
                "X-Multi": ["a", "b"],
            },
        });
        let request = HttpV1Adapter.adapt(raw).unwrap();
        assert_eq!(request.header("x-mixed"), Some("single"));
        // Last value of the multi-valued list wins.
        assert_eq!(request.header("x-multi"), Some("b"));
    }

    #[test]
    fn v1_decodes_base64_body() {
        let raw = json!({
            "httpMethod": "POST",
            "path": "/t",
            "body": BASE64.encode(b"binary payload"),
            "isBase64Encoded": true,
        });
        let request = HttpV1Adapter.adapt(raw).unwrap();
        assert_eq!(request.body.as_deref(), Some(&b"binary payload"[..]));
    }

    #[test]
    fn v1_rejects_invalid_base64() {
        let raw = json!({
            "httpMethod": "POST",
            "path": "/t",
            "body": "!!not base64!!",
            "isBase64Encoded": true,
        });
        assert!(HttpV1Adapter.adapt(raw).is_err());
    }

    #[test]
    fn v1_preserves_query_and_path_params() {
        let raw = json!({
            "httpMethod": "GET",
            "path": "/users/42",
            "queryStringParameters": {"page": "2"},
            "multiValueQueryStringParameters": {"tag": ["x", "y"]},
            "pathParameters": {"id": "42"},
        });
        let request = HttpV1Adapter.adapt(raw).unwrap();
        assert_eq!(request.query("page"), Some("2"));
        assert_eq!(request.query("tag"), Some("y"));
        assert_eq!(request.param("id"), Some("42"));
    }

    #[test]
    fn v2_requires_both_discriminators() {
        assert!(!HttpV2Adapter.can_handle(&json!({"version": "2.0"})));
        assert!(!HttpV2Adapter.can_handle(&json!({
            "requestContext": {"http": {"method": "GET"}},
        })));
        assert!(HttpV2Adapter.can_handle(&json!({
            "version": "2.0",
            "requestContext": {"http": {"method": "GET", "path": "/x"}},
        })));
    }

    #[test]
    fn v2_takes_method_and_path_from_request_context() {
        let raw = json!({
            "version": "2.0",
            "rawPath": "/fallback",
            "requestContext": {
                "requestId": "r-2",
                "http": {"method": "PUT", "path": "/primary"},
            },
        });
        let request = HttpV2Adapter.adapt(raw).unwrap();
        assert_eq!(request.method, "PUT");
        assert_eq!(request.path, "/primary");
        assert_eq!(request.meta("requestId"), Some("r-2"));
    }

    #[test]
    fn v1_retains_raw_event() {
        let raw = json!({"httpMethod": "GET", "path": "/t", "resource": "/t"});
        let request = HttpV1Adapter.adapt(raw.clone()).unwrap();
        assert_eq!(request.raw_event, raw);
    }
}
