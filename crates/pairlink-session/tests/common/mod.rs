#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use pairlink_protocol::{CredentialRecord, SessionId};
use pairlink_session::{
    CloseEvent, CredentialEncoder, CredentialPayload, CredentialStore, HandlerError,
    MemoryCredentialStore, RegistryBuilder, RenderError, SessionHandler, SessionRegistry,
    StoreError,
};
use pairlink_socket::{ChannelConnector, RemoteLink};
use serde_json::{Value, json};
use tokio::sync::mpsc;

pub type Registry<K = MemoryCredentialStore> = SessionRegistry<ChannelConnector, K>;

/// A registry wired to an in-memory connector and a credential store.
pub struct Harness<K: CredentialStore = MemoryCredentialStore> {
    pub registry: Registry<K>,
    pub connector: ChannelConnector,
    pub store: Arc<K>,
    links: mpsc::UnboundedReceiver<RemoteLink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(RegistryBuilder::new().encoder(ImgEncoder))
    }

    pub fn with(builder: RegistryBuilder) -> Self {
        Self::with_store(builder, Arc::new(MemoryCredentialStore::new()))
    }
}

impl<K: CredentialStore> Harness<K> {
    pub fn with_store(builder: RegistryBuilder, store: Arc<K>) -> Self {
        let (connector, links) = ChannelConnector::new();
        let registry = builder.build(connector.clone(), Arc::clone(&store));
        Self {
            registry,
            connector,
            store,
            links,
        }
    }

    /// The remote side of the next socket the registry opens.
    pub async fn next_link(&mut self) -> RemoteLink {
        self.links.recv().await.expect("connector dropped")
    }

    /// Returns `true` if no socket was opened since the last `next_link`.
    pub fn no_new_link(&mut self) -> bool {
        self.links.try_recv().is_err()
    }
}

pub fn sid(id: &str) -> SessionId {
    SessionId::from(id)
}

/// A `lastDisconnect` payload in the socket library's usual shape.
pub fn disconnect(code: i64) -> Value {
    json!({ "error": { "output": { "statusCode": code } } })
}

/// Renders `raw` as `img:<raw>`; refuses the pairing string `"bad"`.
pub struct ImgEncoder;

impl CredentialEncoder for ImgEncoder {
    fn encode<'a>(&'a self, raw: &'a str) -> BoxFuture<'a, Result<CredentialPayload, RenderError>> {
        let rendered = if raw == "bad" {
            Err(RenderError("unrenderable".to_string()))
        } else {
            Ok(CredentialPayload::new(format!("img:{raw}")))
        };
        future::ready(rendered).boxed()
    }
}

/// Panics while encoding the pairing string `"boom"`; otherwise like
/// [`ImgEncoder`].
pub struct PanickyEncoder;

impl CredentialEncoder for PanickyEncoder {
    fn encode<'a>(&'a self, raw: &'a str) -> BoxFuture<'a, Result<CredentialPayload, RenderError>> {
        if raw == "boom" {
            panic!("encoder exploded");
        }
        ImgEncoder.encode(raw)
    }
}

/// What a [`Recorder`] saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Credential(String),
    Connected,
    Closed { kind: &'static str, code: Option<&'static str> },
}

/// A handler that forwards every callback to a channel.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Seen>,
    fail: bool,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: false }, rx)
    }

    /// A recorder that reports failure after recording.
    pub fn failing() -> (Self, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: true }, rx)
    }

    fn record(&self, seen: Seen) -> BoxFuture<'static, Result<(), HandlerError>> {
        let _ = self.tx.send(seen);
        let fail = self.fail;
        async move {
            if fail {
                return Err(HandlerError::from("recorder failure"));
            }
            Ok(())
        }
        .boxed()
    }
}

impl SessionHandler for Recorder {
    fn on_credential<'a>(
        &'a self,
        _id: &'a SessionId,
        credential: &'a CredentialPayload,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        self.record(Seen::Credential(credential.as_str().to_string()))
    }

    fn on_connected<'a>(&'a self, _id: &'a SessionId) -> BoxFuture<'a, Result<(), HandlerError>> {
        self.record(Seen::Connected)
    }

    fn on_close<'a>(
        &'a self,
        _id: &'a SessionId,
        event: &'a CloseEvent,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        self.record(Seen::Closed {
            kind: event.kind(),
            code: event.error().map(|error| error.code()),
        })
    }
}

/// Which callback a [`Panicker`] blows up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicOn {
    Credential,
    Connected,
    Close,
}

/// A handler that panics in one callback and succeeds in the others.
///
/// The credential panic happens before a future is returned, the others
/// while the future is polled.
pub struct Panicker(pub PanicOn);

impl SessionHandler for Panicker {
    fn on_credential<'a>(
        &'a self,
        _id: &'a SessionId,
        _credential: &'a CredentialPayload,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        if self.0 == PanicOn::Credential {
            panic!("credential handler exploded");
        }
        future::ready(Ok(())).boxed()
    }

    fn on_connected<'a>(&'a self, _id: &'a SessionId) -> BoxFuture<'a, Result<(), HandlerError>> {
        let panics = self.0 == PanicOn::Connected;
        async move {
            if panics {
                panic!("connected handler exploded");
            }
            Ok(())
        }
        .boxed()
    }

    fn on_close<'a>(
        &'a self,
        _id: &'a SessionId,
        _event: &'a CloseEvent,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        let panics = self.0 == PanicOn::Close;
        async move {
            if panics {
                panic!("close handler exploded");
            }
            Ok(())
        }
        .boxed()
    }
}

/// A [`MemoryCredentialStore`] whose operations can be switched to fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryCredentialStore,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
    fail_remove: AtomicBool,
    saves: AtomicUsize,
    removes: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_load(self) -> Self {
        self.fail_load.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_save(self) -> Self {
        self.fail_save.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_remove(self) -> Self {
        self.fail_remove.store(true, Ordering::SeqCst);
        self
    }

    pub async fn insert(&self, id: &str, record: CredentialRecord) {
        self.inner.insert(id, record).await;
    }

    pub async fn get(&self, id: &SessionId) -> Option<CredentialRecord> {
        self.inner.get(id).await
    }

    /// `save` attempts, failed ones included.
    pub fn save_attempts(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// `remove` attempts, failed ones included.
    pub fn remove_attempts(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl CredentialStore for FailingStore {
    async fn load(&self, id: &SessionId) -> Result<Option<CredentialRecord>, StoreError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("unreadable record".to_string()));
        }
        self.inner.load(id).await
    }

    async fn save(&self, id: &SessionId, record: &CredentialRecord) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.save(id, record).await
    }

    async fn remove(&self, id: &SessionId) -> Result<(), StoreError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.remove(id).await
    }
}

/// Receives the next recorded callback, failing the test after 5 seconds.
pub async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no callback within 5s")
        .expect("recorder dropped")
}
