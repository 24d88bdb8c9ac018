//! Typed payloads for the routed message vocabulary.
//!
//! Field names follow the backend's camelCase wire convention. Every struct
//! here converts to/from the free-form `payload` member of a
//! [`MessageData`](crate::envelope::MessageData).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reader credentials: the persisted id/token pair.
///
/// Inbound as the REGISTER response payload, outbound as the AUTHENTICATE
/// event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderCredentials {
    pub id: u32,
    pub token: String,
}

/// Inbound AUTHENTICATE command: authenticate the presented tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagAuthRequest {
    pub authentication_key: String,
    pub key_number: u8,
}

/// Response to a tag AUTHENTICATE command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagAuthResult {
    pub authentication_successful: bool,
}

/// Inbound CHANGE_KEYS command.
///
/// `keys` maps single-digit slot numbers ("0".."4") to new keys in hex.
/// The map is ordered so slot 0, when present, is always first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeKeysRequest {
    pub authentication_key: String,
    pub keys: BTreeMap<String, String>,
}

/// Response to CHANGE_KEYS: which slots rotated, which failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeKeysResult {
    pub successful_keys: Vec<u8>,
    pub failed_keys: Vec<u8>,
}

/// Outbound NFC_TAP event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapReport {
    #[serde(rename = "cardUID")]
    pub card_uid: String,
}

/// Outbound KEY_PRESSED event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: String,
}

/// READER_AUTHENTICATED payload: the device name assigned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    #[serde(default)]
    pub name: String,
}

/// Free-text notice, e.g. the UNAUTHORIZED reason or the
/// ENABLE_CARD_CHECKING prompt line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    #[serde(default)]
    pub message: String,
}

/// SHOW_TEXT payload: two display lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLines {
    #[serde(default)]
    pub line_one: String,
    #[serde(default)]
    pub line_two: String,
}

/// DISPLAY_SUCCESS / DISPLAY_ERROR payload: transient banner.
/// Duration 0 means sticky.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credentials_wire_shape() {
        let c = ReaderCredentials {
            id: 7,
            token: "abc123".into(),
        };
        assert_eq!(serde_json::to_value(&c).unwrap(), json!({"id": 7, "token": "abc123"}));
    }

    #[test]
    fn tap_report_uses_uppercase_uid_field() {
        let t = TapReport {
            card_uid: "04aabbcc".into(),
        };
        assert_eq!(serde_json::to_value(&t).unwrap(), json!({"cardUID": "04aabbcc"}));
    }

    #[test]
    fn change_keys_request_parses_slot_map() {
        let v = json!({
            "authenticationKey": "00112233445566778899aabbccddeeff",
            "keys": {"0": "aa", "2": "bb"}
        });
        let req: ChangeKeysRequest = serde_json::from_value(v).unwrap();
        let slots: Vec<&str> = req.keys.keys().map(String::as_str).collect();
        assert_eq!(slots, vec!["0", "2"]);
    }

    #[test]
    fn change_keys_result_wire_shape() {
        let r = ChangeKeysResult {
            successful_keys: vec![0],
            failed_keys: vec![2],
        };
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"successfulKeys": [0], "failedKeys": [2]})
        );
    }

    #[test]
    fn notice_tolerates_empty_payload() {
        let n: Notice = serde_json::from_value(json!({})).unwrap();
        assert_eq!(n.message, "");
    }
}
