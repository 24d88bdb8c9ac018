//! Message envelope encoding and decoding.
//!
//! Every frame on the wire is one JSON object:
//! `{"event": "EVENT"|"RESPONSE", "data": {"type": <string>, "payload": {...}}}`.
//! The heartbeat is the degenerate envelope `{"event": "HEARTBEAT"}` with no
//! data member. Envelopes are built per send and never retained.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from envelope encoding/decoding.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("envelope encoding failed: {0}")]
    Encode(String),

    #[error("payload does not match {kind}: {reason}")]
    BadPayload { kind: String, reason: String },
}

/// Top-level frame discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// Unsolicited message (device-initiated or server-initiated).
    Event,
    /// Reply to a previously received event.
    Response,
    /// Bare liveness frame, no data member.
    Heartbeat,
}

/// The typed part of an envelope: message type plus free-form payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl MessageData {
    /// Decode the payload into a typed struct.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| EnvelopeError::BadPayload {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }
}

/// One wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
}

impl Envelope {
    /// Build a device-initiated event.
    pub fn event(kind: &str, payload: Value) -> Self {
        Self {
            event: EventKind::Event,
            data: Some(MessageData {
                kind: kind.to_string(),
                payload,
            }),
        }
    }

    /// Build a response to a server command.
    pub fn response(kind: &str, payload: Value) -> Self {
        Self {
            event: EventKind::Response,
            data: Some(MessageData {
                kind: kind.to_string(),
                payload,
            }),
        }
    }

    /// Build the bare heartbeat frame.
    pub fn heartbeat() -> Self {
        Self {
            event: EventKind::Heartbeat,
            data: None,
        }
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    /// Parse one frame. The transport guarantees one JSON object per read;
    /// anything that does not parse as an envelope is a protocol fault the
    /// caller logs and drops.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

/// Message type vocabulary.
pub mod kind {
    // Inbound (server → reader)
    pub const REGISTER: &str = "REGISTER";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const READER_AUTHENTICATED: &str = "READER_AUTHENTICATED";
    pub const ENABLE_CARD_CHECKING: &str = "ENABLE_CARD_CHECKING";
    pub const DISABLE_CARD_CHECKING: &str = "DISABLE_CARD_CHECKING";
    pub const AUTHENTICATE: &str = "AUTHENTICATE";
    pub const CHANGE_KEYS: &str = "CHANGE_KEYS";
    pub const REAUTHENTICATE: &str = "REAUTHENTICATE";
    pub const SHOW_TEXT: &str = "SHOW_TEXT";
    pub const HIDE_TEXT: &str = "HIDE_TEXT";
    pub const DISPLAY_SUCCESS: &str = "DISPLAY_SUCCESS";
    pub const DISPLAY_ERROR: &str = "DISPLAY_ERROR";

    // Outbound (reader → server)
    pub const NFC_TAP: &str = "NFC_TAP";
    pub const KEY_PRESSED: &str = "KEY_PRESSED";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_round_trip_preserves_type_and_payload() {
        let env = Envelope::event(kind::NFC_TAP, json!({"cardUID": "04a1b2c3d4e5f6"}));
        let bytes = env.encode().unwrap();
        let back = Envelope::decode(&bytes).unwrap();

        assert_eq!(back.event, EventKind::Event);
        let data = back.data.unwrap();
        assert_eq!(data.kind, kind::NFC_TAP);
        assert_eq!(data.payload, json!({"cardUID": "04a1b2c3d4e5f6"}));
    }

    #[test]
    fn response_round_trip() {
        let env = Envelope::response(kind::AUTHENTICATE, json!({"authenticationSuccessful": true}));
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn heartbeat_is_bare() {
        let bytes = Envelope::heartbeat().encode().unwrap();
        assert_eq!(bytes, br#"{"event":"HEARTBEAT"}"#.to_vec());

        let back = Envelope::decode(&bytes).unwrap();
        assert_eq!(back.event, EventKind::Heartbeat);
        assert!(back.data.is_none());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Envelope::decode(b"not json at all").is_err());
        assert!(Envelope::decode(b"{\"event\":\"NO_SUCH\"}").is_err());
    }

    #[test]
    fn decode_tolerates_missing_payload() {
        let back = Envelope::decode(br#"{"event":"EVENT","data":{"type":"HIDE_TEXT"}}"#).unwrap();
        let data = back.data.unwrap();
        assert_eq!(data.kind, "HIDE_TEXT");
        assert!(data.payload.is_null());
    }
}
