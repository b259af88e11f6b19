//! Messaging socket abstraction for Pairlink.
//!
//! The messaging network's wire protocol lives in an external socket
//! library. Pairlink only needs three things from it, captured by two
//! traits:
//!
//! - [`Connector`]: opens a raw connection for a session, given whatever
//!   credentials were stored for it, and hands back the socket plus the
//!   stream of [`SocketEvent`]s it will emit.
//! - [`Socket`]: the live connection: send a message, request a pairing
//!   code, close.
//!
//! Events travel over a bounded `mpsc` channel owned by exactly one
//! receiver (the session's actor task). Dropping that receiver is how a
//! session "detaches its listeners": the socket can keep emitting, but
//! nothing will ever process those events again.
//!
//! # Feature Flags
//!
//! - `channel` (default): [`ChannelConnector`], an in-memory socket
//!   driven by a [`RemoteLink`]; used by tests and the demo.

#![allow(async_fn_in_trait)]

#[cfg(feature = "channel")]
mod channel;
mod error;

#[cfg(feature = "channel")]
pub use channel::{ChannelConnector, ChannelSocket, RemoteLink, SentMessage};
pub use error::SocketError;

use std::future::Future;

use pairlink_protocol::{
    CredentialRecord, Jid, MessageContent, MessageReceipt, PairingCode,
    PhoneDigits, SendOptions, SessionId, SocketEvent,
};
use tokio::sync::mpsc;

/// The receiving end of a socket's event stream.
pub type SocketEvents = mpsc::Receiver<SocketEvent>;

/// A freshly opened connection: the socket and its event stream.
pub struct Opened<S> {
    /// The live socket.
    pub socket: S,
    /// Events emitted by `socket`, in arrival order.
    pub events: SocketEvents,
}

/// A live connection to the messaging network.
///
/// # Trait bounds
///
/// - `Send + Sync` → the socket is shared (behind an `Arc`) between the
///   session's actor task and callers sending messages.
/// - `'static` → it lives as long as the session, not as long as a borrow.
///
/// The async methods spell out `impl Future + Send` instead of `async fn`
/// so the futures can be awaited inside spawned tasks.
pub trait Socket: Send + Sync + 'static {
    /// Sends a message and returns the socket's receipt unchanged.
    fn send_message(
        &self,
        jid: &Jid,
        content: &MessageContent,
        options: &SendOptions,
    ) -> impl Future<Output = Result<MessageReceipt, SocketError>> + Send;

    /// Asks the network for a numeric pairing code for `phone`.
    fn request_pairing_code(
        &self,
        phone: &PhoneDigits,
    ) -> impl Future<Output = Result<PairingCode, SocketError>> + Send;

    /// Requests the connection to close. Must be idempotent.
    fn close(&self);
}

/// Opens sockets.
///
/// `credentials` is `None` for a session that has never been linked; the
/// socket will then start issuing pairing strings (QR codes).
pub trait Connector: Send + Sync + 'static {
    /// The socket type produced by this connector.
    type Socket: Socket;

    /// Opens a new raw connection for `id`.
    fn connect(
        &self,
        id: &SessionId,
        credentials: Option<CredentialRecord>,
    ) -> impl Future<Output = Result<Opened<Self::Socket>, SocketError>> + Send;
}
