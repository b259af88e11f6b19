//! Session actor: an isolated Tokio task that owns one session attempt.
//!
//! Each attempt runs in its own task and is the only code that touches its
//! socket's event stream, its deferreds, its handlers and its timeout. The
//! loop multiplexes three inputs with `tokio::select!`:
//!
//! - **commands** from [`SessionHandle`]s (end, replace, new handlers),
//! - **socket events**, processed one at a time in arrival order,
//! - the **credential deadline**, armed on open and cleared by the first
//!   pairing credential or a successful connect.
//!
//! Every handler is awaited before the next input is taken, so no two
//! updates for one session interleave.
//!
//! Teardown drops the event receiver (detaching the socket's listeners),
//! closes the socket and flips `closed`. After that the loop exits, so no
//! late event from the old socket can reach this attempt.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;

use pairlink_protocol::{ConnectionStatus, ConnectionUpdate, CredentialRecord, SessionId, SocketEvent};
use pairlink_socket::{Connector, Opened, Socket, SocketEvents};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};

use crate::registry::{RegistryInner, restart_task};
use crate::handlers::panic_message;
use crate::{
    CloseEvent, CredentialEncoder, CredentialPayload, CredentialSlot, CredentialStore, Deferred,
    Promise, RenderError, SessionError, SessionHandlers, SessionPhase, classify,
};

/// Commands sent to a session actor through its channel.
pub(crate) enum SessionCommand {
    /// Caller-initiated end. Removes credentials when `remove_credentials`.
    End {
        remove_credentials: bool,
        reply: oneshot::Sender<()>,
    },

    /// A new `create_session` for the same id takes over. No `on_close`.
    Replace { reply: oneshot::Sender<()> },

    /// Swap the caller handlers (the status handler stays).
    UpdateHandlers {
        handlers: SessionHandlers,
        reply: oneshot::Sender<()>,
    },
}

/// Handle to one running session attempt.
///
/// Cheap to clone. The registry keeps one per live id; callers get clones
/// to observe the attempt's promises and phase.
pub struct SessionHandle<S> {
    id: SessionId,
    generation: u64,
    commands: mpsc::Sender<SessionCommand>,
    socket: Arc<S>,
    first_credential: Promise<Option<CredentialPayload>>,
    connected: Promise<()>,
    phase: watch::Receiver<SessionPhase>,
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            generation: self.generation,
            commands: self.commands.clone(),
            socket: Arc::clone(&self.socket),
            first_credential: self.first_credential.clone(),
            connected: self.connected.clone(),
            phase: self.phase.clone(),
        }
    }
}

impl<S: Socket> SessionHandle<S> {
    /// The session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Registry-unique number of this attempt. A restart gets a new one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The attempt's current phase.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Returns `true` once the handshake completed and the attempt is live.
    pub fn is_connected(&self) -> bool {
        self.phase().is_connected()
    }

    /// Settles with the first rendered pairing credential, or `None` when
    /// the session connected with stored credentials.
    pub fn first_credential(&self) -> Promise<Option<CredentialPayload>> {
        self.first_credential.clone()
    }

    /// Settles when the handshake completes, or with the reason it never
    /// will for this attempt.
    pub fn connected(&self) -> Promise<()> {
        self.connected.clone()
    }

    /// Waits until the attempt is torn down and returns its final phase.
    pub async fn wait_closed(&self) -> SessionPhase {
        let mut phase = self.phase.clone();
        let _ = phase.wait_for(SessionPhase::is_final).await;
        *phase.borrow()
    }

    pub(crate) fn socket(&self) -> &S {
        &self.socket
    }

    /// Ends the attempt. Returns `false` if it had already shut down.
    pub(crate) async fn end(&self, remove_credentials: bool) -> bool {
        let (reply, done) = oneshot::channel();
        let command = SessionCommand::End {
            remove_credentials,
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }

    /// Tears the attempt down for a replacement. Returns `false` if it had
    /// already shut down.
    pub(crate) async fn replace(&self) -> bool {
        let (reply, done) = oneshot::channel();
        if self.commands.send(SessionCommand::Replace { reply }).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }

    /// Swaps the caller handlers. Returns once the actor applied them.
    pub(crate) async fn replace_handlers(&self, handlers: SessionHandlers) -> bool {
        let (reply, done) = oneshot::channel();
        let command = SessionCommand::UpdateHandlers { handlers, reply };
        if self.commands.send(command).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }
}

/// Everything needed to start one attempt.
pub(crate) struct SessionParts<C: Connector, K: CredentialStore> {
    pub id: SessionId,
    pub generation: u64,
    pub opened: Opened<C::Socket>,
    pub handlers: SessionHandlers,
    pub credentials: CredentialSlot<K>,
    pub encoder: Arc<dyn CredentialEncoder>,
    pub credential_timeout: Duration,
    pub command_buffer: usize,
    pub registry: Weak<RegistryInner<C, K>>,
}

/// The internal actor state. Runs inside a Tokio task.
pub(crate) struct SessionActor<C: Connector, K: CredentialStore> {
    id: SessionId,
    generation: u64,
    socket: Arc<C::Socket>,
    /// `None` once detached.
    events: Option<SocketEvents>,
    commands: mpsc::Receiver<SessionCommand>,
    first_credential: Deferred<Option<CredentialPayload>>,
    connected: Deferred<()>,
    handlers: SessionHandlers,
    deadline: Option<Instant>,
    closed: bool,
    credentials: CredentialSlot<K>,
    encoder: Arc<dyn CredentialEncoder>,
    phase: watch::Sender<SessionPhase>,
    registry: Weak<RegistryInner<C, K>>,
}

/// Builds an actor and its handle without spawning it.
///
/// The registry inserts the handle before spawning, so the actor can never
/// try to release a slot that isn't there yet.
pub(crate) fn build_session<C, K>(
    parts: SessionParts<C, K>,
) -> (SessionActor<C, K>, SessionHandle<C::Socket>)
where
    C: Connector,
    K: CredentialStore,
{
    let SessionParts {
        id,
        generation,
        opened,
        handlers,
        credentials,
        encoder,
        credential_timeout,
        command_buffer,
        registry,
    } = parts;

    let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
    let (phase_tx, phase_rx) = watch::channel(SessionPhase::AwaitingCredential);
    let socket = Arc::new(opened.socket);
    let first_credential = Deferred::new(id.clone());
    let connected = Deferred::new(id.clone());

    let handle = SessionHandle {
        id: id.clone(),
        generation,
        commands: command_tx,
        socket: Arc::clone(&socket),
        first_credential: first_credential.promise(),
        connected: connected.promise(),
        phase: phase_rx,
    };

    let actor = SessionActor {
        id,
        generation,
        socket,
        events: Some(opened.events),
        commands: command_rx,
        first_credential,
        connected,
        handlers,
        deadline: Some(Instant::now() + credential_timeout),
        closed: false,
        credentials,
        encoder,
        phase: phase_tx,
        registry,
    };

    (actor, handle)
}

impl<C: Connector, K: CredentialStore> SessionActor<C, K> {
    /// Runs the actor loop until the attempt is torn down.
    pub(crate) async fn run(mut self) {
        tracing::info!(
            session_id = %self.id,
            generation = self.generation,
            "session actor started"
        );

        while !self.closed {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::debug!(session_id = %self.id, "all handles dropped");
                        self.teardown(
                            true,
                            SessionError::SessionEnded(self.id.clone()),
                            SessionPhase::Closed,
                        )
                        .await;
                    }
                },
                event = next_event(&mut self.events) => self.handle_event(event).await,
                () = expire(self.deadline) => self.handle_credential_timeout().await,
            }
        }

        tracing::info!(
            session_id = %self.id,
            generation = self.generation,
            "session actor stopped"
        );
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::End {
                remove_credentials,
                reply,
            } => {
                tracing::info!(session_id = %self.id, remove_credentials, "session ending");
                self.handlers.close(&self.id, &CloseEvent::Ended).await;
                self.teardown(
                    !remove_credentials,
                    SessionError::SessionEnded(self.id.clone()),
                    SessionPhase::Closed,
                )
                .await;
                let _ = reply.send(());
            }
            SessionCommand::Replace { reply } => {
                tracing::info!(session_id = %self.id, "session replaced by a new attempt");
                self.teardown(
                    true,
                    SessionError::Superseded(self.id.clone()),
                    SessionPhase::Closed,
                )
                .await;
                let _ = reply.send(());
            }
            SessionCommand::UpdateHandlers { handlers, reply } => {
                tracing::debug!(session_id = %self.id, handlers = handlers.len(), "handlers replaced");
                self.handlers.replace_callers(handlers);
                let _ = reply.send(());
            }
        }
    }

    async fn handle_event(&mut self, event: Option<SocketEvent>) {
        match event {
            Some(SocketEvent::CredentialsUpdated(record)) => {
                self.persist_credentials(record).await;
            }
            Some(SocketEvent::Connection(update)) => {
                self.handle_connection_update(update).await;
            }
            None => {
                tracing::warn!(session_id = %self.id, "socket event stream ended");
                self.events = None;
                self.handle_close(None).await;
            }
        }
    }

    async fn persist_credentials(&self, record: CredentialRecord) {
        match self.credentials.save(&record).await {
            Ok(()) => tracing::debug!(session_id = %self.id, "credentials saved"),
            Err(error) => {
                tracing::warn!(session_id = %self.id, %error, "saving credentials failed");
            }
        }
    }

    async fn handle_connection_update(&mut self, update: ConnectionUpdate) {
        if self.closed {
            tracing::debug!(session_id = %self.id, "update for closed session ignored");
            return;
        }

        let ConnectionUpdate {
            status,
            qr,
            last_disconnect,
        } = update;

        if let Some(raw) = qr {
            self.handle_pairing_string(&raw).await;
            if self.closed {
                return;
            }
        }

        match status {
            Some(ConnectionStatus::Open) => self.handle_open().await,
            Some(ConnectionStatus::Close) => self.handle_close(last_disconnect).await,
            Some(ConnectionStatus::Connecting) | None => {}
        }
    }

    async fn handle_pairing_string(&mut self, raw: &str) {
        let payload = match self.render(raw).await {
            Ok(payload) => payload,
            Err(render) => {
                let error = SessionError::CredentialRenderFailed {
                    id: self.id.clone(),
                    reason: render.0,
                };
                tracing::warn!(session_id = %self.id, %error, "pairing credential not rendered");
                self.first_credential.reject_once(error.clone());
                self.connected.reject_once(error.clone());
                let event = CloseEvent::Closed {
                    error,
                    details: None,
                };
                self.handlers.close(&self.id, &event).await;
                // The failure is local; the stored credentials are still good.
                self.teardown(
                    true,
                    SessionError::SessionEnded(self.id.clone()),
                    SessionPhase::Closed,
                )
                .await;
                return;
            }
        };

        self.deadline = None;
        if self.first_credential.resolve_once(Some(payload.clone())) {
            tracing::info!(session_id = %self.id, "pairing credential issued");
        } else {
            tracing::debug!(session_id = %self.id, "pairing credential refreshed");
        }
        self.handlers.credential(&self.id, &payload).await;
    }

    /// Encodes `raw`, reporting an encoder panic as a render failure.
    async fn render(&self, raw: &str) -> Result<CredentialPayload, RenderError> {
        let encoder = Arc::clone(&self.encoder);
        match AssertUnwindSafe(async { encoder.encode(raw).await })
            .catch_unwind()
            .await
        {
            Ok(rendered) => rendered,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(session_id = %self.id, %reason, "credential encoder panicked");
                Err(RenderError(format!("encoder panicked: {reason}")))
            }
        }
    }

    async fn handle_open(&mut self) {
        self.deadline = None;
        self.first_credential.resolve_once(None);
        if !self.connected.resolve_once(()) {
            tracing::debug!(session_id = %self.id, "duplicate open ignored");
            return;
        }

        self.phase.send_replace(SessionPhase::Connected);
        tracing::info!(
            session_id = %self.id,
            generation = self.generation,
            "session connected"
        );
        self.handlers.connected(&self.id).await;
    }

    async fn handle_close(&mut self, last_disconnect: Option<Value>) {
        let outcome = classify(last_disconnect.as_ref());

        if outcome.should_restart {
            tracing::info!(
                session_id = %self.id,
                reason = %outcome.reason,
                "transient close, restarting"
            );
            self.teardown(
                outcome.keep_credentials,
                SessionError::Superseded(self.id.clone()),
                SessionPhase::Restarting,
            )
            .await;
            return;
        }

        tracing::info!(
            session_id = %self.id,
            reason = %outcome.reason,
            keep_credentials = outcome.keep_credentials,
            "session closed"
        );
        let error = SessionError::ConnectionClosed {
            id: self.id.clone(),
            outcome,
            details: last_disconnect.clone(),
        };
        self.connected.reject_once(error.clone());
        self.first_credential.reject_once(error.clone());
        let event = CloseEvent::Closed {
            error,
            details: last_disconnect,
        };
        self.handlers.close(&self.id, &event).await;
        self.teardown(
            outcome.keep_credentials,
            SessionError::SessionEnded(self.id.clone()),
            SessionPhase::Closed,
        )
        .await;
    }

    async fn handle_credential_timeout(&mut self) {
        self.deadline = None;
        if self.first_credential.is_settled() {
            return;
        }

        let error = SessionError::CredentialTimeout(self.id.clone());
        tracing::warn!(session_id = %self.id, "no pairing credential before the timeout");
        self.first_credential.reject_once(error.clone());
        self.connected.reject_once(error.clone());
        self.handlers
            .close(&self.id, &CloseEvent::Timeout { error })
            .await;
        self.teardown(
            true,
            SessionError::SessionEnded(self.id.clone()),
            SessionPhase::Closed,
        )
        .await;
    }

    /// Shuts this attempt down. Idempotent.
    ///
    /// `pending` settles whichever deferred is still open. A `Restarting`
    /// phase hands the handlers to the registry and schedules a fresh
    /// attempt once everything here is released.
    async fn teardown(&mut self, keep_credentials: bool, pending: SessionError, phase: SessionPhase) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.deadline = None;
        self.events = None;
        self.socket.close();

        let restarting = phase == SessionPhase::Restarting;
        let registry = self.registry.upgrade();
        let mut restart_from = None;
        if let Some(registry) = registry {
            // Released before settling, so a waiter woken by the rejection
            // can't find this attempt in the registry any more.
            let handoff = restarting.then(|| self.handlers.clone());
            if registry.release(&self.id, self.generation, handoff).await && restarting {
                restart_from = Some(registry);
            }
        }

        self.first_credential.reject_once(pending.clone());
        self.connected.reject_once(pending);

        if !keep_credentials {
            match self.credentials.remove().await {
                Ok(()) => tracing::info!(session_id = %self.id, "credentials removed"),
                Err(error) => {
                    tracing::warn!(session_id = %self.id, %error, "removing credentials failed");
                }
            }
        }

        self.phase.send_replace(phase);
        tracing::info!(
            session_id = %self.id,
            generation = self.generation,
            %phase,
            keep_credentials,
            "session torn down"
        );

        if let Some(registry) = restart_from {
            tokio::spawn(restart_task(registry, self.id.clone()));
        }
    }
}

/// Next socket event, or pending forever once detached.
async fn next_event(events: &mut Option<SocketEvents>) -> Option<SocketEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Fires at `deadline`, or never when no deadline is armed.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
