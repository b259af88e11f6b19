//! Tenant-facing error messages.
//!
//! Every error kind maps to one stable English sentence. Callers that sit
//! behind an HTTP API return these verbatim; the machine-readable kind is
//! available separately through [`PairlinkError::code`].

use pairlink_protocol::{ProtocolError, StatusCode};
use pairlink_session::SessionError;

use crate::PairlinkError;

pub(crate) fn user_message(error: &PairlinkError) -> &'static str {
    match error {
        PairlinkError::Protocol(error) => protocol_message(error),
        PairlinkError::Session(error) => session_message(error),
    }
}

fn protocol_message(error: &ProtocolError) -> &'static str {
    match error {
        ProtocolError::JidRequired => "A recipient is required.",
        ProtocolError::InvalidJid(_) => "The recipient is not a valid number or address.",
        ProtocolError::PhoneRequired => {
            "Set a phone number on the instance before requesting a pairing code."
        }
        ProtocolError::InvalidPhone(_) => {
            "The configured phone number can't be used to generate a pairing code."
        }
    }
}

fn session_message(error: &SessionError) -> &'static str {
    match error {
        SessionError::CredentialTimeout(_) => {
            "We couldn't generate the QR code in time. Please try again."
        }
        SessionError::CredentialRenderFailed { .. } => {
            "Something went wrong rendering the QR code. Try again in a few seconds."
        }
        SessionError::ConnectionClosed { outcome, .. }
            if outcome.status_code == Some(StatusCode::RESTART_REQUIRED) =>
        {
            "The messaging network rejected the connection attempt. Open the app on your \
             phone, check that linked devices are active, and try again."
        }
        SessionError::ConnectionClosed { .. } => {
            "The connection closed before it was ready. Try again in a few minutes."
        }
        SessionError::ConnectionTimeout(_) => "The instance is not connected right now.",
        SessionError::SessionEnded(_) => "The instance was turned off.",
        SessionError::Superseded(_) => {
            "The connection was restarted. Check the instance status in a moment."
        }
        SessionError::PairingNotPending(_) => "Turn the instance on to get a new code.",
        SessionError::PairingPhoneMissing(_) => {
            "Set a phone number on the instance before requesting a pairing code."
        }
        SessionError::PairingRequestFailed { .. } => {
            "We couldn't get the pairing code. Try again in a few seconds."
        }
        SessionError::AlreadyConnected(_) => "The instance is already connected.",
        SessionError::DeliveryFailed { .. } => "We couldn't send the message.",
        SessionError::OpenFailed { .. } => {
            "We can't reach the messaging network right now. Try again in a moment."
        }
    }
}

#[cfg(test)]
mod tests {
    use pairlink_protocol::SessionId;
    use pairlink_session::DisconnectOutcome;

    use super::*;

    fn closed(code: i64) -> PairlinkError {
        SessionError::ConnectionClosed {
            id: SessionId::from("a"),
            outcome: DisconnectOutcome::from_status(Some(StatusCode(code))),
            details: None,
        }
        .into()
    }

    #[test]
    fn test_user_message_restart_required_has_own_text() {
        let restart = closed(515).user_message();
        let generic = closed(428).user_message();

        assert!(restart.contains("rejected"));
        assert_ne!(restart, generic);
    }

    #[test]
    fn test_user_message_missing_phone_matches_protocol_and_session() {
        let protocol: PairlinkError = ProtocolError::PhoneRequired.into();
        let session: PairlinkError = SessionError::PairingPhoneMissing(SessionId::from("a")).into();

        assert_eq!(protocol.user_message(), session.user_message());
    }

    #[test]
    fn test_user_message_timeout() {
        let error: PairlinkError = SessionError::CredentialTimeout(SessionId::from("a")).into();

        assert!(error.user_message().contains("in time"));
    }
}
