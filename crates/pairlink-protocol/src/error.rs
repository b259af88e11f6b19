//! Error types for the protocol layer.
//!
//! Each crate in Pairlink defines its own error enum. A `ProtocolError`
//! always means the *input* was malformed (an address that can't be
//! normalized), never that a session or socket misbehaved.

/// Errors that can occur while normalizing protocol values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A recipient was required but the input was blank.
    #[error("recipient jid is required")]
    JidRequired,

    /// The recipient could not be turned into a jid.
    #[error("invalid jid: {0}")]
    InvalidJid(String),

    /// A phone number was required but the input was blank.
    #[error("phone number is required")]
    PhoneRequired,

    /// The phone number has too few or too many digits to be dialable.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
}
