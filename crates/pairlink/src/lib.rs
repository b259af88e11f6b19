//! # Pairlink
//!
//! Multi-tenant messaging session service.
//!
//! Pairlink keeps one live connection per tenant instance to a messaging
//! network that pairs devices by QR code. Callers implement
//! [`SessionHandler`](pairlink_session::SessionHandler) to observe the
//! lifecycle and the framework handles pairing, reconnects, credential
//! persistence and message delivery.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pairlink::prelude::*;
//!
//! // Provide a Connector for your socket library and a CredentialStore,
//! // then:
//! // let pairlink = Pairlink::builder().build(connector, Arc::new(store));
//! // let ticket = pairlink.create_session("tenant-1", SessionHandlers::new()).await?;
//! // let qr = ticket.first_credential().await?;
//! ```

mod error;
mod messages;
mod service;

pub use error::PairlinkError;
pub use service::{Pairlink, PairlinkBuilder};

pub use pairlink_protocol as protocol;
pub use pairlink_session as session;
pub use pairlink_socket as socket;

pub mod prelude {
    pub use std::sync::Arc;

    pub use pairlink_protocol::{
        CredentialRecord, Jid, MessageContent, MessageReceipt, PairingCode, PhoneDigits,
        SendOptions, SessionId,
    };
    pub use pairlink_session::{
        CloseEvent, CredentialEncoder, CredentialPayload, CredentialStore, HandlerError,
        InstanceStatus, MemoryCredentialStore, SessionConfig, SessionError, SessionHandler,
        SessionHandlers, SessionPhase, StatusSink,
    };
    pub use pairlink_socket::{Connector, Socket};

    pub use crate::{Pairlink, PairlinkBuilder, PairlinkError};
}
