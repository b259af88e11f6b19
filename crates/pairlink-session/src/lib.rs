//! Session lifecycle management for Pairlink.
//!
//! This crate owns, at most once per session id, a live connection to the
//! messaging socket and everything that happens to it:
//!
//! 1. **Opening**: load stored credentials ([`CredentialStore`]), open a
//!    socket, arm the credential timeout.
//! 2. **Pairing**: render each pairing string ([`CredentialEncoder`]),
//!    settle the `first_credential` promise, notify handlers.
//! 3. **Connecting**: settle the `connected` promise on open.
//! 4. **Closing**: classify the disconnect ([`classify`]), restart on
//!    transient closes, erase credentials on logout.
//!
//! # How it fits in the stack
//!
//! ```text
//! Pairlink facade (above)  ← create/start/disconnect/send/pair
//!     ↕
//! Session Layer (this crate)  ← registry, per-session actors, classification
//!     ↕
//! Socket Layer (below)  ← Connector/Socket traits, raw events
//! ```
//!
//! Each session attempt is an actor task (see [`SessionHandle`]); the
//! [`SessionRegistry`] serializes every operation on one id behind a
//! per-id gate so no id ever has two sockets.

#![allow(async_fn_in_trait)]

mod actor;
mod classify;
mod config;
mod deferred;
mod encoder;
mod error;
mod handlers;
mod registry;
mod store;

pub use actor::SessionHandle;
pub use classify::{DisconnectOutcome, DisconnectReason, classify, extract_status};
pub use config::{SessionConfig, SessionPhase};
pub use deferred::{Deferred, Promise};
pub use encoder::{CredentialEncoder, CredentialPayload, FnEncoder, RawEncoder, encoder_fn};
pub use error::{HandlerError, RenderError, SessionError, StoreError};
pub use handlers::{CloseEvent, InstanceStatus, SessionHandler, SessionHandlers, StatusSink};
pub use registry::{RegistryBuilder, SessionRegistry, SessionTicket};
pub use store::{CredentialSlot, CredentialStore, MemoryCredentialStore};
