//! `Pairlink` builder and service facade.
//!
//! This is the entry point for embedding Pairlink in a tenant-facing
//! service. It ties the layers together: raw input → protocol
//! normalization → session registry → socket.

use std::sync::Arc;

use pairlink_protocol::{
    Jid, MessageContent, MessageReceipt, PairingCode, PhoneDigits, SendOptions, SessionId,
};
use pairlink_session::{
    CredentialEncoder, CredentialStore, RegistryBuilder, SessionConfig, SessionError,
    SessionHandle, SessionHandlers, SessionPhase, SessionRegistry, SessionTicket, StatusSink,
};
use pairlink_socket::Connector;

use crate::PairlinkError;

/// Builder for configuring a [`Pairlink`] service.
///
/// # Example
///
/// ```rust,ignore
/// use pairlink::prelude::*;
///
/// let pairlink = Pairlink::builder()
///     .config(SessionConfig::default())
///     .encoder(my_qr_encoder)
///     .status_sink(my_instance_table)
///     .build(connector, Arc::new(store));
/// let ticket = pairlink.create_session("tenant-1", SessionHandlers::new()).await?;
/// ```
pub struct PairlinkBuilder {
    registry: RegistryBuilder,
}

impl PairlinkBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            registry: RegistryBuilder::new(),
        }
    }

    /// Sets the session timing configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.registry = self.registry.config(config);
        self
    }

    /// Sets how pairing strings are rendered for the tenant.
    pub fn encoder(mut self, encoder: impl CredentialEncoder) -> Self {
        self.registry = self.registry.encoder(encoder);
        self
    }

    /// Mirrors every session's lifecycle into `sink`.
    pub fn status_sink(mut self, sink: impl StatusSink) -> Self {
        self.registry = self.registry.status_sink(sink);
        self
    }

    /// Builds the service on top of `connector` and `store`.
    pub fn build<C, K>(self, connector: C, store: Arc<K>) -> Pairlink<C, K>
    where
        C: Connector,
        K: CredentialStore,
    {
        Pairlink {
            registry: self.registry.build(connector, store),
        }
    }
}

impl Default for PairlinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tenant-facing session service.
///
/// Cheap to clone; clones share the same sessions.
pub struct Pairlink<C: Connector, K: CredentialStore> {
    registry: SessionRegistry<C, K>,
}

impl<C: Connector, K: CredentialStore> Clone for Pairlink<C, K> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<C: Connector, K: CredentialStore> Pairlink<C, K> {
    /// Creates a new builder.
    pub fn builder() -> PairlinkBuilder {
        PairlinkBuilder::new()
    }

    /// The underlying session registry.
    pub fn registry(&self) -> &SessionRegistry<C, K> {
        &self.registry
    }

    /// Starts a fresh session, replacing any existing attempt for `id`.
    pub async fn create_session(
        &self,
        id: impl Into<SessionId>,
        handlers: SessionHandlers,
    ) -> Result<SessionTicket<C, K>, PairlinkError> {
        let id = id.into();
        Ok(self.registry.create_session(&id, handlers).await?)
    }

    /// Like [`create_session`](Self::create_session), but refuses with
    /// `already-connected` when `id` is connected. Used to turn an
    /// instance on or to regenerate its QR code.
    ///
    /// Regenerating only pairs again when nothing is stored for `id`. An
    /// instance that was linked before (ended, or still pending after a
    /// restart) resumes with its stored credentials: no QR is issued and
    /// the ticket's first credential resolves to `None`. Call
    /// [`disconnect_session`](Self::disconnect_session) first to force a
    /// fresh pairing.
    pub async fn start(
        &self,
        id: impl Into<SessionId>,
        handlers: SessionHandlers,
    ) -> Result<SessionTicket<C, K>, PairlinkError> {
        let id = id.into();
        if self.registry.status(&id).await == Some(SessionPhase::Connected) {
            tracing::debug!(session_id = %id, "start refused, already connected");
            return Err(SessionError::AlreadyConnected(id).into());
        }
        self.create_session(id, handlers).await
    }

    /// Returns the live attempt for `id`, starting one if needed.
    pub async fn ensure(
        &self,
        id: impl Into<SessionId>,
        handlers: Option<SessionHandlers>,
    ) -> Result<SessionHandle<C::Socket>, PairlinkError> {
        let id = id.into();
        Ok(self.registry.ensure(&id, handlers).await?)
    }

    /// Turns the instance off. Credentials are kept, so the next start
    /// resumes without pairing.
    pub async fn end_session(&self, id: impl Into<SessionId>) -> bool {
        self.registry.end(&id.into()).await
    }

    /// Logs the instance out and erases its credentials.
    pub async fn disconnect_session(&self, id: impl Into<SessionId>) -> bool {
        self.registry.disconnect(&id.into()).await
    }

    /// Sends a message from `id` to `to` (a jid or a phone number).
    pub async fn send_message(
        &self,
        id: impl Into<SessionId>,
        to: &str,
        content: impl Into<MessageContent>,
        options: SendOptions,
    ) -> Result<MessageReceipt, PairlinkError> {
        let id = id.into();
        let jid = Jid::parse(to)?;
        let content = content.into();
        Ok(self
            .registry
            .send_message(&id, &jid, &content, &options)
            .await?)
    }

    /// Requests a numeric pairing code for the pending instance `id`.
    ///
    /// A missing or blank `phone` is reported as `pairing-phone-missing`
    /// (after the pending check); a non-blank one that isn't dialable is
    /// rejected before the session is consulted.
    pub async fn request_pairing_code(
        &self,
        id: impl Into<SessionId>,
        phone: Option<&str>,
    ) -> Result<PairingCode, PairlinkError> {
        let id = id.into();
        let phone = match phone.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(PhoneDigits::parse(raw)?),
            None => None,
        };
        Ok(self
            .registry
            .request_pairing_code(&id, phone.as_ref())
            .await?)
    }

    /// Phase of the live attempt for `id`, if any.
    pub async fn status(&self, id: impl Into<SessionId>) -> Option<SessionPhase> {
        self.registry.status(&id.into()).await
    }
}
