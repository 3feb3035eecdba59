//! Record-batch adapters: queue (SQS) and object store (S3)
//!
//! Both envelope classes arrive as a `Records` array; the first record's
//! `eventSource` decides which adapter may claim the batch.

use serde_json::Value;

use super::EventAdapter;
use crate::error::{LiftError, Result};
use crate::request::{Request, TriggerType};

fn first_record_source(raw: &Value) -> Option<&str> {
    raw.get("Records")?
        .as_array()?
        .first()?
        .get("eventSource")?
        .as_str()
}

fn records(raw: &Value) -> Vec<Value> {
    raw.get("Records")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// SQS queue batches
pub struct QueueAdapter;

impl EventAdapter for QueueAdapter {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::Queue
    }

    fn can_handle(&self, raw: &Value) -> bool {
        matches!(first_record_source(raw), Some(source) if source.starts_with("aws:sqs"))
    }

    fn adapt(&self, raw: Value) -> Result<Request> {
        self.validate(&raw)?;
        let mut request = Request::new(TriggerType::Queue);
        request.records = records(&raw);
        if let Some(arn) = request
            .records
            .first()
            .and_then(|r| r.get("eventSourceARN"))
            .and_then(Value::as_str)
        {
            request
                .metadata
                .insert("eventSourceARN".to_string(), arn.to_string());
        }
        request.raw_event = raw;
        Ok(request)
    }

    fn validate(&self, raw: &Value) -> Result<()> {
        let records = raw
            .get("Records")
            .and_then(Value::as_array)
            .ok_or_else(|| LiftError::validation("Records array is required"))?;
        if records.is_empty() {
            return Err(LiftError::validation("Records must not be empty"));
        }
        if !self.can_handle(raw) {
            return Err(LiftError::validation("records are not an SQS batch"));
        }
        Ok(())
    }
}

/// S3 object-notification batches
pub struct ObjectStoreAdapter;

impl EventAdapter for ObjectStoreAdapter {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::ObjectStore
    }

    fn can_handle(&self, raw: &Value) -> bool {
        matches!(first_record_source(raw), Some(source) if source.starts_with("aws:s3"))
    }

    fn adapt(&self, raw: Value) -> Result<Request> {
        self.validate(&raw)?;
        let mut request = Request::new(TriggerType::ObjectStore);
        request.records = records(&raw);
        if let Some(first) = request.records.first() {
            if let Some(bucket) = first
                .pointer("/s3/bucket/name")
                .and_then(Value::as_str)
            {
                request.metadata.insert("bucket".to_string(), bucket.to_string());
            }
            if let Some(key) = first.pointer("/s3/object/key").and_then(Value::as_str) {
                request.metadata.insert("key".to_string(), key.to_string());
            }
        }
        request.raw_event = raw;
        Ok(request)
    }

    fn validate(&self, raw: &Value) -> Result<()> {
        let records = raw
            .get("Records")
            .and_then(Value::as_array)
            .ok_or_else(|| LiftError::validation("Records array is required"))?;
        let first = records
            .first()
            .ok_or_else(|| LiftError::validation("Records must not be empty"))?;
        if !self.can_handle(raw) {
            return Err(LiftError::validation("records are not an S3 batch"));
        }
        if first.pointer("/s3/bucket/name").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("s3.bucket.name is required"));
        }
        if first.pointer("/s3/object/key").and_then(Value::as_str).is_none() {
            return Err(LiftError::validation("s3.object.key is required"));
        }
        Ok(())
    }
}
