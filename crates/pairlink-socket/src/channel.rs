//! In-memory socket driven over channels.
//!
//! Every [`ChannelConnector::connect`] call produces a [`ChannelSocket`]
//! for the session side and a [`RemoteLink`] for whoever plays the
//! messaging network (a test, or the demo's simulator). The link emits
//! events into the socket's stream and observes what the session sends.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use pairlink_protocol::{
    ConnectionUpdate, CredentialRecord, Jid, MessageContent, MessageReceipt,
    PairingCode, PhoneDigits, SendOptions, SessionId, SocketEvent,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::{Connector, Opened, Socket, SocketError};

/// Event channel size for each opened socket.
const EVENT_BUFFER: usize = 64;

/// Counters shared by a connector and every socket it opened.
#[derive(Default)]
struct ConnectorState {
    connects: AtomicUsize,
    open: AtomicUsize,
    refuse_next: Mutex<Option<String>>,
}

/// Per-socket state shared between the socket and its remote link.
struct LinkState {
    closed: AtomicBool,
    send_failure: Mutex<Option<String>>,
    pairing: Mutex<Result<String, String>>,
    connector: Arc<ConnectorState>,
}

impl LinkState {
    fn mark_closed(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        if first {
            self.connector.open.fetch_sub(1, Ordering::SeqCst);
        }
        first
    }
}

/// Opens in-memory sockets and reports each one as a [`RemoteLink`].
#[derive(Clone)]
pub struct ChannelConnector {
    links: mpsc::UnboundedSender<RemoteLink>,
    state: Arc<ConnectorState>,
}

impl ChannelConnector {
    /// Creates a connector and the receiver its remote links arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteLink>) {
        let (links, rx) = mpsc::unbounded_channel();
        let connector = Self {
            links,
            state: Arc::new(ConnectorState::default()),
        };
        (connector, rx)
    }

    /// Total number of sockets ever opened.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of sockets opened and not yet closed.
    pub fn open_count(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Makes the next `connect` call fail with `reason`.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        *lock(&self.state.refuse_next) = Some(reason.into());
    }
}

impl Connector for ChannelConnector {
    type Socket = ChannelSocket;

    async fn connect(
        &self,
        id: &SessionId,
        credentials: Option<CredentialRecord>,
    ) -> Result<Opened<ChannelSocket>, SocketError> {
        if let Some(reason) = lock(&self.state.refuse_next).take() {
            tracing::debug!(session_id = %id, %reason, "channel connect refused");
            return Err(SocketError::ConnectFailed(reason));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(LinkState {
            closed: AtomicBool::new(false),
            send_failure: Mutex::new(None),
            pairing: Mutex::new(Err("no pairing code configured".to_string())),
            connector: Arc::clone(&self.state),
        });

        let serial = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.open.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session_id = %id, serial, "channel socket opened");

        // The receiver may be gone when nobody is scripting the remote
        // side; the socket still works, it just never emits anything.
        let _ = self.links.send(RemoteLink {
            session_id: id.clone(),
            credentials: credentials.clone(),
            serial,
            events: event_tx,
            sent: sent_rx,
            shared: Arc::clone(&shared),
        });

        Ok(Opened {
            socket: ChannelSocket {
                session_id: id.clone(),
                shared,
                sent: sent_tx,
                next_message: AtomicU64::new(1),
            },
            events: event_rx,
        })
    }
}

/// A message recorded by a [`ChannelSocket`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// Recipient, exactly as passed to `send_message`.
    pub jid: Jid,
    /// Content, exactly as passed to `send_message`.
    pub content: MessageContent,
    /// Options, exactly as passed to `send_message`.
    pub options: SendOptions,
}

/// The session side of an in-memory connection.
pub struct ChannelSocket {
    session_id: SessionId,
    shared: Arc<LinkState>,
    sent: mpsc::UnboundedSender<SentMessage>,
    next_message: AtomicU64,
}

impl Socket for ChannelSocket {
    async fn send_message(
        &self,
        jid: &Jid,
        content: &MessageContent,
        options: &SendOptions,
    ) -> Result<MessageReceipt, SocketError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        if let Some(reason) = lock(&self.shared.send_failure).take() {
            return Err(SocketError::SendFailed(reason));
        }

        let n = self.next_message.fetch_add(1, Ordering::SeqCst);
        let _ = self.sent.send(SentMessage {
            jid: jid.clone(),
            content: content.clone(),
            options: options.clone(),
        });

        Ok(MessageReceipt::new(json!({
            "key": { "id": format!("{}-{n}", self.session_id), "remoteJid": jid.as_str() },
            "status": "pending",
        })))
    }

    async fn request_pairing_code(
        &self,
        phone: &PhoneDigits,
    ) -> Result<PairingCode, SocketError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        tracing::debug!(session_id = %self.session_id, %phone, "pairing code requested");
        lock(&self.shared.pairing)
            .clone()
            .map(PairingCode::new)
            .map_err(SocketError::PairingRejected)
    }

    fn close(&self) {
        if self.shared.mark_closed() {
            tracing::debug!(session_id = %self.session_id, "channel socket closed");
        }
    }
}

/// The network side of an in-memory connection.
///
/// Plays the role of the messaging server: emit updates, watch what the
/// session sends, decide how pairing and sends behave.
pub struct RemoteLink {
    session_id: SessionId,
    credentials: Option<CredentialRecord>,
    serial: usize,
    events: mpsc::Sender<SocketEvent>,
    sent: mpsc::UnboundedReceiver<SentMessage>,
    shared: Arc<LinkState>,
}

impl RemoteLink {
    /// The session this socket was opened for.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The credentials the socket was opened with.
    pub fn credentials(&self) -> Option<&CredentialRecord> {
        self.credentials.as_ref()
    }

    /// 1-based position of this socket among all sockets the connector opened.
    pub fn serial(&self) -> usize {
        self.serial
    }

    /// Emits an event. Returns `false` once the session stopped listening.
    pub async fn emit(&self, event: SocketEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Emits a pairing string.
    pub async fn qr(&self, raw: &str) -> bool {
        self.emit(SocketEvent::Connection(ConnectionUpdate::qr(raw))).await
    }

    /// Emits a handshake-complete update.
    pub async fn open(&self) -> bool {
        self.emit(SocketEvent::Connection(ConnectionUpdate::open())).await
    }

    /// Emits a close update with the given disconnect payload.
    pub async fn close_with(&self, last_disconnect: Value) -> bool {
        self.emit(SocketEvent::Connection(ConnectionUpdate::close(Some(
            last_disconnect,
        ))))
        .await
    }

    /// Emits a credential refresh.
    pub async fn update_credentials(&self, record: CredentialRecord) -> bool {
        self.emit(SocketEvent::CredentialsUpdated(record)).await
    }

    /// Waits for the next message the session sent.
    pub async fn next_sent(&mut self) -> Option<SentMessage> {
        self.sent.recv().await
    }

    /// Makes the next send fail with `reason`.
    pub fn fail_next_send(&self, reason: impl Into<String>) {
        *lock(&self.shared.send_failure) = Some(reason.into());
    }

    /// Makes pairing-code requests return `code`.
    pub fn set_pairing_code(&self, code: impl Into<String>) {
        *lock(&self.shared.pairing) = Ok(code.into());
    }

    /// Makes pairing-code requests fail with `reason`.
    pub fn reject_pairing(&self, reason: impl Into<String>) {
        *lock(&self.shared.pairing) = Err(reason.into());
    }

    /// `true` once the session asked the socket to close.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// `true` once the session dropped its end of the event stream.
    pub fn is_detached(&self) -> bool {
        self.events.is_closed()
    }

    /// Resolves once the session dropped its end of the event stream.
    pub async fn detached(&self) {
        self.events.closed().await;
    }
}

/// Locks a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
