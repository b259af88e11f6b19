//! Error types for the session layer.
//!
//! [`SessionError`] is the only error that crosses this crate's public
//! boundary for lifecycle outcomes. Socket, store and encoder failures are
//! converted into one of its kinds before any caller sees them, and each
//! kind has a stable string [`code`](SessionError::code) for the layer
//! above to map to user-facing text.

use pairlink_protocol::SessionId;
use serde_json::Value;

use crate::{DisconnectOutcome, DisconnectReason};

/// Classified outcome of a failed session operation.
///
/// `Clone` because one settled outcome is observed by every awaiter of a
/// session's promises.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Neither a pairing credential nor a connection arrived in time.
    #[error("session {0}: no pairing credential before the timeout")]
    CredentialTimeout(SessionId),

    /// The pairing string could not be rendered.
    #[error("session {id}: rendering the pairing credential failed: {reason}")]
    CredentialRenderFailed { id: SessionId, reason: String },

    /// The socket closed for a reason that does not warrant a restart.
    #[error("session {id}: connection closed ({outcome})")]
    ConnectionClosed {
        id: SessionId,
        outcome: DisconnectOutcome,
        details: Option<Value>,
    },

    /// A send waited too long for the session to connect.
    #[error("session {0}: not connected within the send window")]
    ConnectionTimeout(SessionId),

    /// The session was torn down before this outcome settled.
    #[error("session {0} ended")]
    SessionEnded(SessionId),

    /// A newer attempt for the same id took over (restart or re-create).
    #[error("session {0} was superseded by a newer attempt")]
    Superseded(SessionId),

    /// A pairing code was requested but no session is awaiting one.
    #[error("session {0} is not waiting for pairing")]
    PairingNotPending(SessionId),

    /// A pairing code was requested without a phone number.
    #[error("session {0}: a phone number is required for pairing")]
    PairingPhoneMissing(SessionId),

    /// The socket refused to issue a pairing code.
    #[error("session {id}: pairing code request failed: {reason}")]
    PairingRequestFailed { id: SessionId, reason: String },

    /// The session is already connected.
    #[error("session {0} is already connected")]
    AlreadyConnected(SessionId),

    /// The socket failed to deliver a message.
    #[error("session {id}: delivery failed: {reason}")]
    DeliveryFailed { id: SessionId, reason: String },

    /// Loading credentials or opening the socket failed.
    #[error("session {id}: could not open socket: {reason}")]
    OpenFailed { id: SessionId, reason: String },
}

impl SessionError {
    /// Stable, machine-readable kind of this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CredentialTimeout(_) => "credential-timeout",
            Self::CredentialRenderFailed { .. } => "credential-render-failed",
            Self::ConnectionClosed { .. } => "connection-closed",
            Self::ConnectionTimeout(_) => "connection-timeout",
            Self::SessionEnded(_) => "session-ended",
            Self::Superseded(_) => "superseded",
            Self::PairingNotPending(_) => "pairing-not-pending",
            Self::PairingPhoneMissing(_) => "pairing-phone-missing",
            Self::PairingRequestFailed { .. } => "pairing-request-failed",
            Self::AlreadyConnected(_) => "already-connected",
            Self::DeliveryFailed { .. } => "delivery-failed",
            Self::OpenFailed { .. } => "open-failed",
        }
    }

    /// The session this error belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::CredentialTimeout(id)
            | Self::ConnectionTimeout(id)
            | Self::SessionEnded(id)
            | Self::Superseded(id)
            | Self::PairingNotPending(id)
            | Self::PairingPhoneMissing(id)
            | Self::AlreadyConnected(id) => id,
            Self::CredentialRenderFailed { id, .. }
            | Self::ConnectionClosed { id, .. }
            | Self::PairingRequestFailed { id, .. }
            | Self::DeliveryFailed { id, .. }
            | Self::OpenFailed { id, .. } => id,
        }
    }

    /// The classified disconnect reason, for `connection-closed` errors.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            Self::ConnectionClosed { outcome, .. } => Some(outcome.reason),
            _ => None,
        }
    }
}

/// Errors reported by a [`CredentialStore`](crate::CredentialStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("credential store backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded.
    #[error("stored credentials are corrupt: {0}")]
    Corrupt(String),
}

/// The pairing string could not be rendered into a credential payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// A session handler callback failed. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}
