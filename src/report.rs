//! Report records, outbound envelopes and the dispatcher.

use crate::config::TrackerState;
use crate::transparency::SharedTransparencyLog;
use crate::transport::{Beacon, Transport};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// One captured signal, ready to be merged into an envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    /// Category label (`click`, `error`, `pushState`, ...)
    pub event: String,
    /// Purpose of the signal within its category
    pub target_key: String,
    /// Payload fixed at subscription time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description, failures only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReportRecord {
    pub fn new(event: impl Into<String>, target_key: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            target_key: target_key.into(),
            data: None,
            message: None,
        }
    }

    pub fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The JSON object sent for one dispatch.
///
/// Built by shallow-merging, in order, the configuration state, the record
/// and `time`; later keys replace earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Merge `state`, `record` and `time` (ms since the Unix epoch).
    ///
    /// A record that does not serialize to an object is kept under `data`.
    pub fn build<R>(state: &TrackerState, record: &R, time: i64) -> Result<Self, serde_json::Error>
    where
        R: Serialize + ?Sized,
    {
        let mut fields = match serde_json::to_value(state)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        match serde_json::to_value(record)? {
            Value::Object(map) => fields.extend(map),
            Value::Null => {}
            other => {
                fields.insert("data".to_string(), other);
            }
        }

        fields.insert("time".to_string(), Value::from(time));
        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn time(&self) -> Option<i64> {
        self.fields.get("time").and_then(Value::as_i64)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

/// Turns records into envelopes and hands them to the transport.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    log: SharedTransparencyLog,
    last_time: AtomicI64,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, log: SharedTransparencyLog) -> Self {
        Self {
            transport,
            log,
            last_time: AtomicI64::new(i64::MIN),
        }
    }

    /// Build and submit the envelope for `record`.
    ///
    /// Returns whether the transport accepted it. Failures are counted and
    /// logged, never raised.
    pub fn report<R>(&self, state: &TrackerState, record: &R) -> bool
    where
        R: Serialize + ?Sized,
    {
        let envelope = match Envelope::build(state, record, self.next_time()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Failed to serialize report: {e}");
                self.log.record_beacon_dropped();
                return false;
            }
        };

        let event = envelope
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or("custom")
            .to_string();
        let beacon = Beacon::json(state.request_url.clone(), envelope.to_json());

        if self.transport.send_beacon(beacon) {
            tracing::debug!(
                event = %event,
                url = %state.request_url,
                time = envelope.time(),
                "Beacon queued"
            );
            self.log.record_beacon_queued();
            true
        } else {
            tracing::warn!(event = %event, url = %state.request_url, "Beacon refused; dropped");
            self.log.record_beacon_dropped();
            false
        }
    }

    /// Capture time, never earlier than the previous dispatch's.
    fn next_time(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self.last_time.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}
