//! Shared vocabulary for Pairlink.
//!
//! This crate defines the types that every other layer speaks:
//!
//! - **Identity** ([`SessionId`]): the opaque, caller-assigned key of a
//!   tenant instance.
//! - **Socket events** ([`SocketEvent`], [`ConnectionUpdate`]): what the
//!   external messaging socket reports while a session is alive.
//! - **Messages** ([`MessageContent`], [`SendOptions`], [`MessageReceipt`]):
//!   what flows through the send primitive.
//! - **Addresses** ([`Jid`], [`PhoneDigits`]): normalized recipients and
//!   pairing phone numbers.
//! - **Status codes** ([`StatusCode`]): the disconnect codes the socket
//!   library reports, as named constants.
//!
//! # Architecture
//!
//! ```text
//! Socket library (events) → Protocol (typed events) → Session (state machine)
//! ```
//!
//! The protocol crate knows nothing about sessions or sockets; it only
//! describes the data that moves between them.

mod address;
mod error;
mod status;
mod types;

pub use address::{Jid, PhoneDigits, USER_SERVER};
pub use error::ProtocolError;
pub use status::StatusCode;
pub use types::{
    ConnectionStatus, ConnectionUpdate, CredentialRecord, MessageContent,
    MessageReceipt, PairingCode, SendOptions, SessionId, SocketEvent,
};
