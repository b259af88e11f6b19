//! Lifecycle callbacks.
//!
//! Callers observe a session through [`SessionHandler`]: one callback per
//! pairing credential, one when the handshake completes, one when the
//! session closes. A [`SessionHandlers`] set runs every handler in order
//! and logs failures, panics included, instead of propagating them, so
//! one broken callback never stalls the session's event processing.
//!
//! The registry also prepends a [`StatusHandler`] (when a [`StatusSink`]
//! is configured) that mirrors the lifecycle into the instance repository:
//! `pending` with the QR payload, `connected`, and `disconnected` on close
//! or end. A timeout leaves the stored status alone.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pairlink_protocol::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CredentialPayload, HandlerError, SessionError};

/// Why a session's `on_close` fired.
#[derive(Debug, Clone)]
pub enum CloseEvent {
    /// No credential and no connection within the credential window.
    Timeout { error: SessionError },
    /// The socket closed terminally, or the pairing string failed to render.
    Closed {
        error: SessionError,
        details: Option<Value>,
    },
    /// The caller ended or disconnected the session.
    Ended,
}

impl CloseEvent {
    /// `"timeout"`, `"closed"` or `"ended"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Closed { .. } => "closed",
            Self::Ended => "ended",
        }
    }

    /// The error behind this close, if any.
    pub fn error(&self) -> Option<&SessionError> {
        match self {
            Self::Timeout { error } | Self::Closed { error, .. } => Some(error),
            Self::Ended => None,
        }
    }
}

fn done<'a>() -> BoxFuture<'a, Result<(), HandlerError>> {
    async { Ok(()) }.boxed()
}

/// Caller-supplied lifecycle callbacks. Every method defaults to a no-op.
///
/// Callbacks run on the session's own task, in event order, and the next
/// event is not processed until they return. Keep them short.
pub trait SessionHandler: Send + Sync + 'static {
    /// A pairing credential was rendered. Fires for every fresh QR.
    fn on_credential<'a>(
        &'a self,
        id: &'a SessionId,
        credential: &'a CredentialPayload,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        let _ = (id, credential);
        done()
    }

    /// The handshake completed.
    fn on_connected<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<(), HandlerError>> {
        let _ = id;
        done()
    }

    /// The session closed.
    fn on_close<'a>(
        &'a self,
        id: &'a SessionId,
        event: &'a CloseEvent,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        let _ = (id, event);
        done()
    }
}

/// An ordered set of handlers for one session.
///
/// Cloning is cheap; handlers are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct SessionHandlers {
    status: Option<Arc<dyn SessionHandler>>,
    handlers: Vec<Arc<dyn SessionHandler>>,
}

impl SessionHandlers {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler, builder style.
    pub fn with(mut self, handler: impl SessionHandler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Appends an already-shared handler, builder style.
    pub fn with_shared(mut self, handler: Arc<dyn SessionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Number of caller-supplied handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no caller-supplied handler is set.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Prepends the status handler unless one is already applied.
    pub(crate) fn with_status(mut self, sink: Option<&Arc<dyn StatusSink>>) -> Self {
        if self.status.is_none() {
            if let Some(sink) = sink {
                self.status = Some(Arc::new(StatusHandler {
                    sink: Arc::clone(sink),
                }));
            }
        }
        self
    }

    /// Swaps in new caller handlers, keeping the applied status handler.
    pub(crate) fn replace_callers(&mut self, other: SessionHandlers) {
        self.handlers = other.handlers;
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<dyn SessionHandler>> {
        self.status.iter().chain(self.handlers.iter())
    }

    pub(crate) async fn credential(&self, id: &SessionId, credential: &CredentialPayload) {
        for handler in self.iter() {
            run_guarded(id, "credential", async {
                handler.on_credential(id, credential).await
            })
            .await;
        }
    }

    pub(crate) async fn connected(&self, id: &SessionId) {
        for handler in self.iter() {
            run_guarded(id, "connected", async { handler.on_connected(id).await }).await;
        }
    }

    pub(crate) async fn close(&self, id: &SessionId, event: &CloseEvent) {
        tracing::debug!(session_id = %id, kind = event.kind(), "dispatching close");
        for handler in self.iter() {
            run_guarded(id, "close", async { handler.on_close(id, event).await }).await;
        }
    }
}

/// Awaits one callback. An error or a panic is logged and swallowed, so
/// the session keeps processing events either way.
async fn run_guarded<F>(id: &SessionId, callback: &'static str, call: F)
where
    F: Future<Output = Result<(), HandlerError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            tracing::warn!(session_id = %id, callback, %error, "handler failed");
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            tracing::error!(session_id = %id, callback, %reason, "handler panicked");
        }
    }
}

/// The text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

// ---------------------------------------------------------------------------
// Status mirroring
// ---------------------------------------------------------------------------

/// The instance status kept by the layer above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Pending,
    Connected,
    Disconnected,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Where lifecycle status updates are recorded (usually an instance table).
pub trait StatusSink: Send + Sync + 'static {
    /// Records `status` for `id`. `credential` is set only for `Pending`.
    fn update_status<'a>(
        &'a self,
        id: &'a SessionId,
        status: InstanceStatus,
        credential: Option<&'a CredentialPayload>,
    ) -> BoxFuture<'a, Result<(), HandlerError>>;
}

/// Mirrors lifecycle callbacks into a [`StatusSink`].
pub(crate) struct StatusHandler {
    sink: Arc<dyn StatusSink>,
}

impl SessionHandler for StatusHandler {
    fn on_credential<'a>(
        &'a self,
        id: &'a SessionId,
        credential: &'a CredentialPayload,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        self.sink
            .update_status(id, InstanceStatus::Pending, Some(credential))
    }

    fn on_connected<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<(), HandlerError>> {
        self.sink.update_status(id, InstanceStatus::Connected, None)
    }

    fn on_close<'a>(
        &'a self,
        id: &'a SessionId,
        event: &'a CloseEvent,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        match event {
            CloseEvent::Closed { .. } | CloseEvent::Ended => {
                self.sink.update_status(id, InstanceStatus::Disconnected, None)
            }
            CloseEvent::Timeout { .. } => done(),
        }
    }
}
