//! Core data types exchanged between the socket and the session layer.
//!
//! Everything that the external socket library reports (connection
//! updates, refreshed credentials) and everything that flows through its
//! send primitive (message content, options, receipts) is modelled here.
//! The shapes that belong to the messaging network itself stay opaque:
//! they are carried as `serde_json::Value` and never interpreted.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The caller-assigned identifier of a tenant instance.
///
/// This is the sole key into the session registry and the credential
/// store. It's a newtype over `String` for the same reason `PlayerId`-style
/// wrappers exist everywhere: a session id can't be passed where a jid or a
/// phone number is expected, even though all three are strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&SessionId> for SessionId {
    fn from(id: &SessionId) -> Self {
        id.clone()
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Opaque long-term credential material for one session.
///
/// The socket library produces it, the credential store persists it, and
/// the session layer only ever moves it between the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRecord(Value);

impl CredentialRecord {
    /// Wraps a raw credential document.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrows the raw document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwraps the raw document.
    pub fn into_value(self) -> Value {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Socket events
// ---------------------------------------------------------------------------

/// The coarse connection state carried by a connection update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// The socket is still negotiating.
    Connecting,
    /// The handshake completed; the session can send.
    Open,
    /// The socket closed. `last_disconnect` says why.
    Close,
}

/// A connection-update event from the socket.
///
/// Every field is optional because the socket reports partial updates:
/// a fresh QR string arrives without a status, a close arrives with a
/// disconnect payload, and so on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    /// New connection state, if it changed.
    #[serde(rename = "connection")]
    pub status: Option<ConnectionStatus>,

    /// A raw pairing string to be rendered as a QR code.
    pub qr: Option<String>,

    /// The opaque payload describing why the socket closed.
    pub last_disconnect: Option<Value>,
}

impl ConnectionUpdate {
    /// An update announcing a new pairing string.
    pub fn qr(raw: impl Into<String>) -> Self {
        Self {
            qr: Some(raw.into()),
            ..Self::default()
        }
    }

    /// An update announcing the handshake completed.
    pub fn open() -> Self {
        Self {
            status: Some(ConnectionStatus::Open),
            ..Self::default()
        }
    }

    /// An update announcing the socket closed with the given payload.
    pub fn close(last_disconnect: Option<Value>) -> Self {
        Self {
            status: Some(ConnectionStatus::Close),
            last_disconnect,
            ..Self::default()
        }
    }
}

/// Everything the socket can tell the session layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SocketEvent {
    /// The socket refreshed its long-term credentials; persist them.
    CredentialsUpdated(CredentialRecord),

    /// The connection state changed or a pairing string was issued.
    Connection(ConnectionUpdate),
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The body of an outgoing message.
///
/// Plain text is wrapped as `{"text": ...}`; any structured content
/// (media, reactions, ...) passes through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageContent(Value);

impl MessageContent {
    /// A plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("text".to_string(), Value::String(text.into()));
        Self(Value::Object(body))
    }

    /// Returns the text body, if this is a plain text message.
    pub fn as_text(&self) -> Option<&str> {
        self.0.get("text").and_then(Value::as_str)
    }

    /// Borrows the raw content document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<Value> for MessageContent {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::text(text),
            other => Self(other),
        }
    }
}

/// Extra options forwarded verbatim to the socket's send primitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SendOptions(Map<String, Value>);

impl SendOptions {
    /// No options.
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds one option, builder style.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Looks up an option by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` when no options are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whatever the socket returned for a sent message. Opaque to Pairlink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageReceipt(Value);

impl MessageReceipt {
    /// Wraps a raw receipt.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrows the raw receipt.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// A numeric pairing code the user types on their phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingCode(String);

impl PairingCode {
    /// Wraps a code produced by the socket.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the code into groups of four for display (`ABCD EFGH`).
    pub fn grouped(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        chars
            .chunks(4)
            .map(|chunk| chunk.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_display_is_raw_string() {
        let id = SessionId::from("inst-42");
        assert_eq!(id.to_string(), "inst-42");
        assert_eq!(id.as_str(), "inst-42");
    }

    #[test]
    fn test_connection_update_deserializes_socket_shape() {
        let update: ConnectionUpdate = serde_json::from_value(json!({
            "connection": "close",
            "lastDisconnect": { "error": { "output": { "statusCode": 428 } } }
        }))
        .unwrap();

        assert_eq!(update.status, Some(ConnectionStatus::Close));
        assert!(update.qr.is_none());
        assert!(update.last_disconnect.is_some());
    }

    #[test]
    fn test_connection_update_qr_has_no_status() {
        let update = ConnectionUpdate::qr("2@abc");
        assert_eq!(update.qr.as_deref(), Some("2@abc"));
        assert_eq!(update.status, None);
    }

    #[test]
    fn test_message_content_from_string_wraps_text() {
        let content = MessageContent::from(json!("hola"));
        assert_eq!(content.as_value(), &json!({ "text": "hola" }));
        assert_eq!(content.as_text(), Some("hola"));
    }

    #[test]
    fn test_message_content_structured_passes_through() {
        let raw = json!({ "image": { "url": "https://x/y.png" }, "caption": "hi" });
        let content = MessageContent::from(raw.clone());
        assert_eq!(content.as_value(), &raw);
        assert_eq!(content.as_text(), None);
    }

    #[test]
    fn test_send_options_builder() {
        let opts = SendOptions::none().with("quoted", json!("msg-1"));
        assert!(!opts.is_empty());
        assert_eq!(opts.get("quoted"), Some(&json!("msg-1")));
    }

    #[test]
    fn test_pairing_code_grouped() {
        assert_eq!(PairingCode::new("ABCD1234").grouped(), "ABCD 1234");
        assert_eq!(PairingCode::new("123").grouped(), "123");
    }
}
