//! EventBridge adapter, including the scheduled-event special case

use serde_json::Value;

use super::{str_field, EventAdapter};
use crate::error::{LiftError, Result};
use crate::request::{Request, TriggerType};

/// EventBridge messages and scheduled rules
///
/// When `source == "aws.events"` and the detail-type is `Scheduled Event`,
/// the normalized request is tagged [`TriggerType::Scheduled`]. Envelopes
/// with `source == "aws.s3"` stay [`TriggerType::EventBus`]; the event
/// router applies object-store pattern matching to them at dispatch time.
pub struct EventBusAdapter;

const SCHEDULED_SOURCE: &str = "aws.events";
const SCHEDULED_DETAIL_TYPE: &str = "Scheduled Event";

impl EventAdapter for EventBusAdapter {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::EventBus
    }

    fn can_handle(&self, raw: &Value) -> bool {
        raw.get("source").and_then(Value::as_str).is_some()
            && raw.get("detail-type").and_then(Value::as_str).is_some()
    }

    fn adapt(&self, raw: Value) -> Result<Request> {
        self.validate(&raw)?;

        let source = str_field(&raw, "source");
        let detail_type = str_field(&raw, "detail-type");
        let scheduled = source.as_deref() == Some(SCHEDULED_SOURCE)
            && detail_type.as_deref() == Some(SCHEDULED_DETAIL_TYPE);

        let mut request = Request::new(if scheduled {
            TriggerType::Scheduled
        } else {
            TriggerType::EventBus
        });
        request.source = source;
        request.detail_type = detail_type;
        request.detail = raw.get("detail").cloned().unwrap_or(Value::Null);
        request.event_id = str_field(&raw, "id");
        request.timestamp = str_field(&raw, "time");
        request.raw_event = raw;
        Ok(request)
    }

    fn validate(&self, raw: &Value) -> Result<()> {
        if raw.get("source").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("source is required"));
        }
        if raw.get("detail-type").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("detail-type is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_events_keep_event_bus_trigger() {
        let raw = json!({
            "source": "orders.service",
            "detail-type": "OrderPlaced",
            "id": "e-1",
            "time": "2024-03-01T12:00:00Z",
            "detail": {"order_id": "o-9"},
        });
        let request = EventBusAdapter.adapt(raw).unwrap();
        assert_eq!(request.trigger_type, TriggerType::EventBus);
        assert_eq!(request.source.as_deref(), Some("orders.service"));
        assert_eq!(request.detail_type.as_deref(), Some("OrderPlaced"));
        assert_eq!(request.event_id.as_deref(), Some("e-1"));
        assert_eq!(request.timestamp.as_deref(), Some("2024-03-01T12:00:00Z"));
        assert_eq!(request.detail["order_id"], "o-9");
    }

    #[test]
    fn scheduled_events_are_retagged() {
        let raw = json!({
            "source": "aws.events",
            "detail-type": "Scheduled Event",
            "resources": ["arn:aws:events:us-east-1:1:rule/hourly-cleanup"],
            "detail": {},
        });
        let request = EventBusAdapter.adapt(raw).unwrap();
        assert_eq!(request.trigger_type, TriggerType::Scheduled);
    }

    #[test]
    fn s3_bridged_events_stay_event_bus() {
        let raw = json!({
            "source": "aws.s3",
            "detail-type": "Object Created:Put",
            "detail": {"bucket": {"name": "b"}, "object": {"key": "k"}},
        });
        let request = EventBusAdapter.adapt(raw).unwrap();
        assert_eq!(request.trigger_type, TriggerType::EventBus);
    }

    #[test]
    fn requires_source_and_detail_type() {
        assert!(!EventBusAdapter.can_handle(&json!({"source": "x"})));
        assert!(!EventBusAdapter.can_handle(&json!({"detail-type": "x"})));
        assert!(EventBusAdapter
            .validate(&json!({"source": "x"}))
            .is_err());
    }
}
