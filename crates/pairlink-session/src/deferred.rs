//! Single-resolution signals.
//!
//! A [`Deferred`] is created unsettled and settles exactly once: the first
//! `resolve_once`/`reject_once` wins and every later attempt is a no-op.
//! That makes it safe against duplicate socket events. Any number of
//! [`Promise`]s observe the outcome; each one can be awaited directly.
//!
//! Built on a `watch` channel holding `Option<Result<T, SessionError>>`.
//! The channel keeps the settled value around, so a promise subscribed
//! after settlement still sees it. If the `Deferred` is dropped while
//! unsettled, waiting promises resolve to `session-ended`.
//!
//! No timeout logic lives here; callers wrap `wait()` in
//! `tokio::time::timeout` where they need a bound.

use std::future::IntoFuture;

use futures_util::future::BoxFuture;
use pairlink_protocol::SessionId;
use tokio::sync::watch;

use crate::SessionError;

type Slot<T> = Option<Result<T, SessionError>>;

/// The settling side of a single-resolution signal.
pub struct Deferred<T> {
    tx: watch::Sender<Slot<T>>,
    owner: SessionId,
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an unsettled deferred belonging to session `owner`.
    pub fn new(owner: SessionId) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, owner }
    }

    /// Settles with `value`. Returns `false` if already settled.
    pub fn resolve_once(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles with `error`. Returns `false` if already settled.
    pub fn reject_once(&self, error: SessionError) -> bool {
        self.settle(Err(error))
    }

    /// Returns `true` once resolved or rejected.
    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// A new observer of this deferred's outcome.
    pub fn promise(&self) -> Promise<T> {
        Promise {
            rx: self.tx.subscribe(),
            owner: self.owner.clone(),
        }
    }

    fn settle(&self, outcome: Result<T, SessionError>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }
}

/// The observing side of a [`Deferred`].
#[derive(Clone)]
pub struct Promise<T> {
    rx: watch::Receiver<Slot<T>>,
    owner: SessionId,
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Waits for the outcome.
    pub async fn wait(mut self) -> Result<T, SessionError> {
        let settled = match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| Err(SessionError::SessionEnded(self.owner.clone())))
    }

    /// The outcome, if already settled.
    pub fn peek(&self) -> Option<Result<T, SessionError>> {
        (*self.rx.borrow()).clone()
    }

    /// Returns `true` once settled.
    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl<T> IntoFuture for Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, SessionError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
