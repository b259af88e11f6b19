//! Unified error type for Pairlink.

use pairlink_protocol::ProtocolError;
use pairlink_session::SessionError;

use crate::messages;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `pairlink` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PairlinkError {
    /// Malformed input (recipient, phone number).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level failure (timeout, close, delivery, pairing).
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl PairlinkError {
    /// Stable, machine-readable kind of this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol(ProtocolError::JidRequired) => "jid-required",
            Self::Protocol(ProtocolError::InvalidJid(_)) => "invalid-jid",
            Self::Protocol(ProtocolError::PhoneRequired) => "phone-required",
            Self::Protocol(ProtocolError::InvalidPhone(_)) => "invalid-phone",
            Self::Session(error) => error.code(),
        }
    }

    /// Text that can be shown to the tenant as-is.
    pub fn user_message(&self) -> &'static str {
        messages::user_message(self)
    }

    /// The session error, if this is one.
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(error) => Some(error),
            Self::Protocol(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pairlink_protocol::SessionId;

    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let error: PairlinkError = ProtocolError::InvalidJid("@".into()).into();

        assert!(matches!(error, PairlinkError::Protocol(_)));
        assert_eq!(error.code(), "invalid-jid");
        assert!(error.to_string().contains('@'));
    }

    #[test]
    fn test_from_session_error_keeps_code() {
        let error: PairlinkError = SessionError::CredentialTimeout(SessionId::from("a")).into();

        assert!(matches!(error, PairlinkError::Session(_)));
        assert_eq!(error.code(), "credential-timeout");
        assert!(error.as_session().is_some());
    }
}
