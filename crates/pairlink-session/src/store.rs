//! Credential persistence.
//!
//! Pairlink never decides where credentials live. It needs three things
//! from a store, captured by [`CredentialStore`]: load what is known for a
//! session, save a refreshed record, and remove the record on logout.
//! [`CredentialSlot`] binds a store to one session id, which is what a
//! running session holds.
//!
//! [`MemoryCredentialStore`] keeps records in a map and counts calls; it
//! backs the tests and the demo.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pairlink_protocol::{CredentialRecord, SessionId};
use tokio::sync::Mutex;

use crate::StoreError;

/// Async storage for per-session credential records.
///
/// # Trait bounds
///
/// - `Send + Sync` → one store is shared by the registry and every
///   session actor it spawns.
/// - `'static` → it lives as long as the registry.
///
/// # Durability
///
/// A `save` must be durable before the next `load` for the same id; the
/// session relies on that when it reconnects after a restart. `remove`
/// must be idempotent: removing a missing record is not an error.
pub trait CredentialStore: Send + Sync + 'static {
    /// Returns the stored record for `id`, or `None` if it was never linked.
    fn load(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<CredentialRecord>, StoreError>> + Send;

    /// Replaces the stored record for `id`.
    fn save(
        &self,
        id: &SessionId,
        record: &CredentialRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes the stored record for `id`, if any.
    fn remove(&self, id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A credential store bound to one session id.
pub struct CredentialSlot<K> {
    id: SessionId,
    store: Arc<K>,
}

impl<K: CredentialStore> CredentialSlot<K> {
    /// Binds `store` to `id`.
    pub fn new(id: SessionId, store: Arc<K>) -> Self {
        Self { id, store }
    }

    /// The session this slot belongs to.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Loads the record for this session.
    pub async fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        self.store.load(&self.id).await
    }

    /// Saves a refreshed record for this session.
    pub async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.store.save(&self.id, record).await
    }

    /// Removes this session's record.
    pub async fn remove(&self) -> Result<(), StoreError> {
        self.store.remove(&self.id).await
    }
}

/// In-memory credential store with call counters.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<SessionId, CredentialRecord>>,
    saves: AtomicUsize,
    removes: AtomicUsize,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record without counting it as a save.
    pub async fn insert(&self, id: impl Into<SessionId>, record: CredentialRecord) {
        self.records.lock().await.insert(id.into(), record);
    }

    /// Returns a copy of the stored record for `id`.
    pub async fn get(&self, id: &SessionId) -> Option<CredentialRecord> {
        self.records.lock().await.get(id).cloned()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `remove` calls so far, including ones for missing records.
    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, id: &SessionId) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn save(&self, id: &SessionId, record: &CredentialRecord) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.records.lock().await.insert(id.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> Result<(), StoreError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.records.lock().await.remove(id);
        Ok(())
    }
}
