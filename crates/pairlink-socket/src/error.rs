/// Errors reported by a messaging socket.
///
/// These never cross the session layer's public boundary as-is: the
/// session layer converts each one into a classified `SessionError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    /// Opening the raw connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The socket refused or failed to deliver a message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The socket refused to issue a pairing code.
    #[error("pairing code rejected: {0}")]
    PairingRejected(String),

    /// The socket was already closed.
    #[error("socket closed")]
    Closed,
}
