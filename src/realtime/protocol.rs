//! Realtime message protocol definitions
//!
//! ## Server → Client
//!
//! ```json
//! {"type": "new_interaction", "data": {...}}
//! {"type": "error", "detail": "Something went wrong"}
//! ```
//!
//! The payload lives under `data`, or under `detail` for error-style pushes.
//!
//! ## Client → Server
//!
//! ```json
//! {"type": "heartbeat", "timestamp": 1718000000000}
//! ```

use crate::core::error::ClientError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registry key matching every message type
pub const WILDCARD: &str = "*";

/// Close code marking a deliberate disconnect; no reconnect follows it
pub const NORMAL_CLOSURE: u16 = 1000;

/// A decoded server push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    /// Event type used for handler lookup
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl RealtimeMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data: Some(data),
            detail: None,
        }
    }

    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        serde_json::from_str(text).map_err(|e| ClientError::MessageParse {
            message: e.to_string(),
        })
    }

    /// The payload, preferring `data` over `detail`
    pub fn payload(&self) -> Option<&Value> {
        self.data.as_ref().or(self.detail.as_ref())
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness ping, timestamp in milliseconds since the epoch
    Heartbeat { timestamp: i64 },
}

impl ClientMessage {
    pub fn heartbeat() -> Self {
        ClientMessage::Heartbeat {
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_data_payload() {
        let msg = RealtimeMessage::parse(r#"{"type":"new_interaction","data":{"id":7}}"#).unwrap();
        assert_eq!(msg.kind, "new_interaction");
        assert_eq!(msg.payload(), Some(&json!({"id": 7})));
    }

    #[test]
    fn test_parse_detail_payload() {
        let msg = RealtimeMessage::parse(r#"{"type":"error","detail":"boom"}"#).unwrap();
        assert_eq!(msg.payload(), Some(&json!("boom")));
    }

    #[test]
    fn test_data_wins_over_detail() {
        let msg =
            RealtimeMessage::parse(r#"{"type":"x","data":1,"detail":2}"#).unwrap();
        assert_eq!(msg.payload(), Some(&json!(1)));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = RealtimeMessage::parse("{not json").unwrap_err();
        assert_eq!(err.error_code(), "MESSAGE_PARSE_ERROR");
    }

    #[test]
    fn test_missing_type_is_parse_error() {
        assert!(RealtimeMessage::parse(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn test_heartbeat_serialization() {
        let json = serde_json::to_value(ClientMessage::heartbeat()).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }
}
