//! Inbound message routing.
//!
//! Decodes the typed part of an inbound envelope into a routed command.
//! Anything unrecognized or malformed becomes a value the engine logs and
//! drops; routing itself can never fail.

use tapgate_proto::envelope::{kind, MessageData};
use tapgate_proto::payloads::{
    Banner, ChangeKeysRequest, Notice, ReaderCredentials, ReaderInfo, TagAuthRequest, TextLines,
};

/// One routed inbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    /// Registration data issued by the backend.
    Register(ReaderCredentials),
    /// The backend revoked this reader's authorization.
    Unauthorized(Notice),
    /// The backend accepted the reader's credentials.
    ReaderAuthenticated(ReaderInfo),
    /// Start scanning for tags; the notice carries the prompt line.
    EnableCardChecking(Notice),
    /// Stop scanning for tags.
    DisableCardChecking,
    /// Authenticate the presented tag.
    TagAuthenticate(TagAuthRequest),
    /// Rotate tag keys.
    ChangeKeys(ChangeKeysRequest),
    /// Drop local auth state and redo the handshake.
    Reauthenticate,
    Show(TextLines),
    Hide,
    DisplaySuccess(Banner),
    DisplayError(Banner),
    /// Recognized nothing; carries the offending type string.
    Unknown(String),
    /// Recognized the type but not the payload.
    Invalid { kind: String, reason: String },
}

/// Route one inbound message by its `type`.
pub fn route(data: &MessageData) -> InboundCommand {
    fn typed<T, F>(data: &MessageData, wrap: F) -> InboundCommand
    where
        T: serde::de::DeserializeOwned,
        F: FnOnce(T) -> InboundCommand,
    {
        match data.payload_as::<T>() {
            Ok(payload) => wrap(payload),
            Err(e) => InboundCommand::Invalid {
                kind: data.kind.clone(),
                reason: e.to_string(),
            },
        }
    }

    // Display-style payloads may be absent entirely.
    fn lenient<T, F>(data: &MessageData, wrap: F) -> InboundCommand
    where
        T: serde::de::DeserializeOwned + Default,
        F: FnOnce(T) -> InboundCommand,
    {
        if data.payload.is_null() {
            return wrap(T::default());
        }
        typed(data, wrap)
    }

    match data.kind.as_str() {
        kind::REGISTER => typed(data, InboundCommand::Register),
        kind::UNAUTHORIZED => lenient(data, InboundCommand::Unauthorized),
        kind::READER_AUTHENTICATED => lenient(data, InboundCommand::ReaderAuthenticated),
        kind::ENABLE_CARD_CHECKING => lenient(data, InboundCommand::EnableCardChecking),
        kind::DISABLE_CARD_CHECKING => InboundCommand::DisableCardChecking,
        kind::AUTHENTICATE => typed(data, InboundCommand::TagAuthenticate),
        kind::CHANGE_KEYS => typed(data, InboundCommand::ChangeKeys),
        kind::REAUTHENTICATE => InboundCommand::Reauthenticate,
        kind::SHOW_TEXT => lenient(data, InboundCommand::Show),
        kind::HIDE_TEXT => InboundCommand::Hide,
        kind::DISPLAY_SUCCESS => lenient(data, InboundCommand::DisplaySuccess),
        kind::DISPLAY_ERROR => lenient(data, InboundCommand::DisplayError),
        other => InboundCommand::Unknown(other.to_string()),
    }
}
