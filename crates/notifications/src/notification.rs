use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{EventType, Topic};

/// A message addressed to one topic.
///
/// Serializes to the wire shape subscribers receive:
/// `{"type": "...", "payload": ..., "timestamp": <epoch millis>}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    #[serde(skip)]
    pub topic: Topic,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification stamped with the current time.
    pub fn new(topic: Topic, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            topic,
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Creates a `NOTIFICATION` event carrying a human-readable message.
    pub fn message(topic: Topic, message: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            topic,
            event_type: EventType::Notification,
            payload: serde_json::json!({
                "message": message.into(),
                "timestamp": timestamp.timestamp_millis(),
            }),
            timestamp,
        }
    }

    /// Returns the message text of a `NOTIFICATION` event.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("message").and_then(|m| m.as_str())
    }
}
