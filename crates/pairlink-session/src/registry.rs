//! Session registry: at most one session attempt per id.
//!
//! The registry owns three maps, all behind one short-lived lock:
//!
//! - `live`: the running attempt for each id.
//! - `gates`: one async mutex per id with an operation in flight. Every
//!   create, ensure, end, disconnect and restart for an id runs under its
//!   gate, so two callers can never both open a socket for the same id; the
//!   second one waits and then observes what the first produced.
//! - `restarting`: handlers handed over by an attempt that closed
//!   transiently, waiting for the replacement attempt to pick them up.
//!
//! The map lock is never held across an await on a session actor. Gates
//! are, which is fine because actors never take a gate.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use pairlink_protocol::{
    Jid, MessageContent, MessageReceipt, PairingCode, PhoneDigits, SendOptions, SessionId,
};
use pairlink_socket::{Connector, Socket};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};

use crate::actor::{SessionParts, build_session};
use crate::{
    CredentialEncoder, CredentialPayload, CredentialSlot, CredentialStore, Promise, RawEncoder,
    SessionConfig, SessionError, SessionHandle, SessionHandlers, SessionPhase, StatusSink,
};

type Gate = Arc<Mutex<()>>;

struct Slots<S> {
    live: HashMap<SessionId, SessionHandle<S>>,
    gates: HashMap<SessionId, Gate>,
    restarting: HashMap<SessionId, SessionHandlers>,
}

impl<S> Default for Slots<S> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            gates: HashMap::new(),
            restarting: HashMap::new(),
        }
    }
}

/// Shared state behind a [`SessionRegistry`] and its session actors.
pub(crate) struct RegistryInner<C: Connector, K: CredentialStore> {
    connector: C,
    store: Arc<K>,
    encoder: Arc<dyn CredentialEncoder>,
    status_sink: Option<Arc<dyn StatusSink>>,
    config: SessionConfig,
    slots: Mutex<Slots<C::Socket>>,
    generations: AtomicU64,
}

/// Configures and builds a [`SessionRegistry`].
pub struct RegistryBuilder {
    config: SessionConfig,
    encoder: Arc<dyn CredentialEncoder>,
    status_sink: Option<Arc<dyn StatusSink>>,
}

impl RegistryBuilder {
    /// Default config, [`RawEncoder`], no status sink.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            encoder: Arc::new(RawEncoder),
            status_sink: None,
        }
    }

    /// Sets the timing configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the encoder used to render pairing strings.
    pub fn encoder(mut self, encoder: impl CredentialEncoder) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    /// Mirrors every session's lifecycle into `sink`.
    pub fn status_sink(mut self, sink: impl StatusSink) -> Self {
        self.status_sink = Some(Arc::new(sink));
        self
    }

    /// Builds a registry that opens sockets with `connector` and persists
    /// credentials in `store`.
    pub fn build<C, K>(self, connector: C, store: Arc<K>) -> SessionRegistry<C, K>
    where
        C: Connector,
        K: CredentialStore,
    {
        SessionRegistry {
            inner: Arc::new(RegistryInner {
                connector,
                store,
                encoder: self.encoder,
                status_sink: self.status_sink,
                config: self.config,
                slots: Mutex::new(Slots::default()),
                generations: AtomicU64::new(0),
            }),
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns every session attempt, keyed by session id.
///
/// Cheap to clone; clones share the same sessions.
pub struct SessionRegistry<C: Connector, K: CredentialStore> {
    inner: Arc<RegistryInner<C, K>>,
}

impl<C: Connector, K: CredentialStore> Clone for SessionRegistry<C, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector, K: CredentialStore> SessionRegistry<C, K> {
    /// A registry with default configuration.
    pub fn new(connector: C, store: Arc<K>) -> Self {
        RegistryBuilder::new().build(connector, store)
    }

    /// Starts configuring a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The timing configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The connector sockets are opened with.
    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// The credential store.
    pub fn store(&self) -> &Arc<K> {
        &self.inner.store
    }

    /// Starts a fresh session for `id`.
    ///
    /// Any existing attempt for `id` is torn down first (credentials kept,
    /// its promises rejected with `superseded`, no `on_close`), and its
    /// socket is closed before the new one is opened.
    pub async fn create_session(
        &self,
        id: &SessionId,
        handlers: SessionHandlers,
    ) -> Result<SessionTicket<C, K>, SessionError> {
        let gate = self.inner.gate(id).await;
        let guard = gate.lock().await;
        let result = self.inner.create_locked(id, handlers).await;
        drop(guard);
        self.inner.prune_gate(id, gate).await;

        Ok(SessionTicket {
            handle: result?,
            registry: self.clone(),
        })
    }

    /// Returns the live attempt for `id`, joining an in-flight creation or
    /// starting one if needed. Never replaces a running attempt.
    ///
    /// `handlers`, when given, replace the caller handlers of the attempt.
    pub async fn ensure(
        &self,
        id: &SessionId,
        handlers: Option<SessionHandlers>,
    ) -> Result<SessionHandle<C::Socket>, SessionError> {
        if let Some(handle) = self.inner.live(id).await {
            if let Some(handlers) = handlers {
                handle.replace_handlers(handlers).await;
            }
            return Ok(handle);
        }

        let gate = self.inner.gate(id).await;
        let guard = gate.lock().await;
        let result = self.inner.ensure_locked(id, handlers).await;
        drop(guard);
        self.inner.prune_gate(id, gate).await;
        result
    }

    /// Pauses the session for `id`: `on_close(ended)`, credentials kept.
    ///
    /// Returns `true` if a running attempt was ended.
    pub async fn end(&self, id: &SessionId) -> bool {
        let gate = self.inner.gate(id).await;
        let guard = gate.lock().await;
        let ended = match self.inner.take(id).await {
            Some(handle) => handle.end(false).await,
            None => false,
        };
        drop(guard);
        self.inner.prune_gate(id, gate).await;
        ended
    }

    /// Logs the session for `id` out: `on_close(ended)`, credentials
    /// removed, all registry state for `id` dropped.
    ///
    /// Credentials are removed even when no attempt is running. Returns
    /// `true` if a running attempt was ended.
    pub async fn disconnect(&self, id: &SessionId) -> bool {
        let gate = self.inner.gate(id).await;
        let guard = gate.lock().await;
        let ended = match self.inner.take(id).await {
            Some(handle) => handle.end(true).await,
            None => false,
        };
        if !ended {
            if let Err(error) = self.inner.store.remove(id).await {
                tracing::warn!(session_id = %id, %error, "removing credentials failed");
            }
        }
        drop(guard);
        self.inner.prune_gate(id, gate).await;

        tracing::info!(session_id = %id, "session disconnected");
        ended
    }

    /// The live attempt for `id`, if any.
    pub async fn get(&self, id: &SessionId) -> Option<SessionHandle<C::Socket>> {
        self.inner.live(id).await
    }

    /// The phase of the live attempt for `id`, if any.
    pub async fn status(&self, id: &SessionId) -> Option<SessionPhase> {
        self.get(id).await.map(|handle| handle.phase())
    }

    /// Number of live attempts.
    pub async fn live_count(&self) -> usize {
        self.inner.slots.lock().await.live.len()
    }

    /// Sends a message through the session for `id`.
    ///
    /// Uses [`ensure`](Self::ensure), so a missing session is started and a
    /// healthy one is never restarted. A pending session gets until the
    /// connection timeout to connect; an attempt superseded by a restart in
    /// the meantime is followed to its replacement within the same window.
    pub async fn send_message(
        &self,
        id: &SessionId,
        jid: &Jid,
        content: &MessageContent,
        options: &SendOptions,
    ) -> Result<MessageReceipt, SessionError> {
        let deadline = Instant::now() + self.inner.config.connection_timeout;

        let handle = loop {
            let handle = self.ensure(id, None).await?;
            match timeout_at(deadline, handle.connected().wait()).await {
                Ok(Ok(())) => break handle,
                Ok(Err(SessionError::Superseded(_))) => {
                    tracing::debug!(session_id = %id, "session superseded while waiting, retrying");
                }
                Ok(Err(error)) => return Err(error),
                Err(_) => {
                    tracing::warn!(session_id = %id, "session did not connect in time");
                    return Err(SessionError::ConnectionTimeout(id.clone()));
                }
            }
        };

        handle
            .socket()
            .send_message(jid, content, options)
            .await
            .map_err(|error| {
                tracing::warn!(session_id = %id, %jid, %error, "delivery failed");
                SessionError::DeliveryFailed {
                    id: id.clone(),
                    reason: error.to_string(),
                }
            })
    }

    /// Requests a numeric pairing code for the pending session `id`.
    ///
    /// Checked in order: a pending session exists, a phone was supplied,
    /// the socket issues the code.
    pub async fn request_pairing_code(
        &self,
        id: &SessionId,
        phone: Option<&PhoneDigits>,
    ) -> Result<PairingCode, SessionError> {
        let handle = match self.inner.live(id).await {
            Some(handle) if handle.phase().is_pending() => handle,
            _ => return Err(SessionError::PairingNotPending(id.clone())),
        };
        let phone = phone.ok_or_else(|| SessionError::PairingPhoneMissing(id.clone()))?;

        let code = handle
            .socket()
            .request_pairing_code(phone)
            .await
            .map_err(|error| {
                tracing::warn!(session_id = %id, %error, "pairing code request failed");
                SessionError::PairingRequestFailed {
                    id: id.clone(),
                    reason: error.to_string(),
                }
            })?;

        tracing::info!(session_id = %id, "pairing code issued");
        Ok(code)
    }
}

impl<C: Connector, K: CredentialStore> RegistryInner<C, K> {
    async fn live(&self, id: &SessionId) -> Option<SessionHandle<C::Socket>> {
        self.slots.lock().await.live.get(id).cloned()
    }

    /// Removes every trace of `id` except its gate, returning the live
    /// attempt.
    async fn take(&self, id: &SessionId) -> Option<SessionHandle<C::Socket>> {
        let mut slots = self.slots.lock().await;
        slots.restarting.remove(id);
        slots.live.remove(id)
    }

    async fn gate(&self, id: &SessionId) -> Gate {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.gates.entry(id.clone()).or_default())
    }

    /// Drops the gate for `id` once nobody else holds or waits on it.
    async fn prune_gate(&self, id: &SessionId, gate: Gate) {
        let mut slots = self.slots.lock().await;
        let idle = slots
            .gates
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, &gate) && Arc::strong_count(&gate) == 2);
        if idle {
            slots.gates.remove(id);
        }
    }

    /// Unregisters attempt `generation` of `id`. Returns `false` if it was
    /// no longer the live attempt (already replaced, ended or disconnected).
    ///
    /// With `restart_with`, the handlers are parked for the replacement.
    pub(crate) async fn release(
        &self,
        id: &SessionId,
        generation: u64,
        restart_with: Option<SessionHandlers>,
    ) -> bool {
        let mut slots = self.slots.lock().await;
        let current = slots
            .live
            .get(id)
            .is_some_and(|handle| handle.generation() == generation);
        if !current {
            return false;
        }

        slots.live.remove(id);
        if let Some(handlers) = restart_with {
            slots.restarting.insert(id.clone(), handlers);
        }
        true
    }

    async fn create_locked(
        self: &Arc<Self>,
        id: &SessionId,
        handlers: SessionHandlers,
    ) -> Result<SessionHandle<C::Socket>, SessionError> {
        if let Some(prior) = self.take(id).await {
            tracing::info!(
                session_id = %id,
                generation = prior.generation(),
                "replacing existing session"
            );
            prior.replace().await;
        }
        self.open(id, handlers).await
    }

    async fn ensure_locked(
        self: &Arc<Self>,
        id: &SessionId,
        handlers: Option<SessionHandlers>,
    ) -> Result<SessionHandle<C::Socket>, SessionError> {
        let (existing, parked) = {
            let mut slots = self.slots.lock().await;
            match slots.live.get(id) {
                Some(handle) => (Some(handle.clone()), None),
                None => (None, slots.restarting.remove(id)),
            }
        };

        if let Some(handle) = existing {
            if let Some(handlers) = handlers {
                handle.replace_handlers(handlers).await;
            }
            return Ok(handle);
        }

        let handlers = match (parked, handlers) {
            (Some(mut parked), Some(handlers)) => {
                parked.replace_callers(handlers);
                parked
            }
            (Some(parked), None) => parked,
            (None, handlers) => handlers.unwrap_or_default(),
        };
        self.open(id, handlers).await
    }

    async fn restart(self: &Arc<Self>, id: &SessionId) {
        let gate = self.gate(id).await;
        let guard = gate.lock().await;

        let parked = {
            let mut slots = self.slots.lock().await;
            let parked = slots.restarting.remove(id);
            if slots.live.contains_key(id) { None } else { parked }
        };

        match parked {
            Some(handlers) => match self.open(id, handlers).await {
                Ok(handle) => tracing::info!(
                    session_id = %id,
                    generation = handle.generation(),
                    "session restarted"
                ),
                Err(error) => tracing::error!(session_id = %id, %error, "restart failed"),
            },
            None => tracing::debug!(session_id = %id, "restart skipped, id already taken over"),
        }

        drop(guard);
        self.prune_gate(id, gate).await;
    }

    /// Loads credentials, opens a socket and starts an actor for `id`.
    async fn open(
        self: &Arc<Self>,
        id: &SessionId,
        handlers: SessionHandlers,
    ) -> Result<SessionHandle<C::Socket>, SessionError> {
        let credentials = CredentialSlot::new(id.clone(), Arc::clone(&self.store));
        let record = credentials.load().await.map_err(|error| {
            tracing::error!(session_id = %id, %error, "loading credentials failed");
            SessionError::OpenFailed {
                id: id.clone(),
                reason: error.to_string(),
            }
        })?;
        let resumed = record.is_some();

        let opened = self.connector.connect(id, record).await.map_err(|error| {
            tracing::error!(session_id = %id, %error, "socket connect failed");
            SessionError::OpenFailed {
                id: id.clone(),
                reason: error.to_string(),
            }
        })?;

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (actor, handle) = build_session(SessionParts {
            id: id.clone(),
            generation,
            opened,
            handlers: handlers.with_status(self.status_sink.as_ref()),
            credentials,
            encoder: Arc::clone(&self.encoder),
            credential_timeout: self.config.credential_timeout,
            command_buffer: self.config.command_buffer,
            registry: Arc::downgrade(self),
        });

        self.slots.lock().await.live.insert(id.clone(), handle.clone());
        tokio::spawn(actor.run());

        tracing::info!(session_id = %id, generation, resumed, "session opened");
        Ok(handle)
    }
}

/// Re-creates `id` after a transient close.
///
/// A plain function returning a boxed future: the actor spawns this, and
/// this spawns actors.
pub(crate) fn restart_task<C, K>(registry: Arc<RegistryInner<C, K>>, id: SessionId) -> BoxFuture<'static, ()>
where
    C: Connector,
    K: CredentialStore,
{
    Box::pin(async move { registry.restart(&id).await })
}

/// What `create_session` returns: the new attempt's promises and a way to
/// end it.
pub struct SessionTicket<C: Connector, K: CredentialStore> {
    handle: SessionHandle<C::Socket>,
    registry: SessionRegistry<C, K>,
}

impl<C: Connector, K: CredentialStore> SessionTicket<C, K> {
    /// The session id.
    pub fn id(&self) -> &SessionId {
        self.handle.id()
    }

    /// Settles with the first rendered pairing credential, or `None` when
    /// stored credentials were enough to connect.
    pub fn first_credential(&self) -> Promise<Option<CredentialPayload>> {
        self.handle.first_credential()
    }

    /// Settles when this attempt connects. An internal restart rejects it
    /// with `superseded`; use [`SessionRegistry::ensure`] to follow the
    /// replacement.
    pub fn completion(&self) -> Promise<()> {
        self.handle.connected()
    }

    /// The attempt this ticket was issued for.
    pub fn handle(&self) -> &SessionHandle<C::Socket> {
        &self.handle
    }

    /// Ends whatever attempt is live for this id (including one started by
    /// an internal restart). Credentials are kept.
    pub async fn end(&self) -> bool {
        self.registry.end(self.handle.id()).await
    }
}
