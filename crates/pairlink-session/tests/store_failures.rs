//! A credential store that errors must never leave a session half torn
//! down or stop it from processing events.

mod common;

use std::sync::Arc;

use common::{FailingStore, Harness, ImgEncoder, Recorder, Seen, disconnect, next_seen, sid};
use pairlink_protocol::CredentialRecord;
use pairlink_session::{CredentialPayload, RegistryBuilder, SessionHandlers, SessionPhase};
use serde_json::json;

fn record() -> CredentialRecord {
    CredentialRecord::new(json!({ "me": { "id": "5215512345678:1@s.whatsapp.net" } }))
}

fn harness(store: FailingStore) -> Harness<FailingStore> {
    Harness::with_store(RegistryBuilder::new().encoder(ImgEncoder), Arc::new(store))
}

#[tokio::test]
async fn test_logged_out_close_tears_down_when_remove_fails() {
    let mut h = harness(FailingStore::new().failing_remove());
    h.store.insert("L", record()).await;
    let (recorder, mut seen) = Recorder::new();
    let ticket = h
        .registry
        .create_session(&sid("L"), SessionHandlers::new().with(recorder))
        .await
        .unwrap();
    let link = h.next_link().await;

    link.close_with(disconnect(401)).await;

    assert_eq!(ticket.completion().await.unwrap_err().code(), "connection-closed");
    assert_eq!(
        next_seen(&mut seen).await,
        Seen::Closed { kind: "closed", code: Some("connection-closed") }
    );
    assert_eq!(ticket.handle().wait_closed().await, SessionPhase::Closed);
    assert!(link.is_closed());
    assert_eq!(h.store.remove_attempts(), 1);
    assert_eq!(h.registry.live_count().await, 0);
    assert_eq!(h.registry.status(&sid("L")).await, None);
    assert!(h.no_new_link());
}

#[tokio::test]
async fn test_disconnect_tears_down_when_remove_fails() {
    let mut h = harness(FailingStore::new().failing_remove());
    h.store.insert("D", record()).await;
    let ticket = h
        .registry
        .create_session(&sid("D"), SessionHandlers::new())
        .await
        .unwrap();
    let link = h.next_link().await;
    link.open().await;
    ticket.completion().await.unwrap();

    assert!(h.registry.disconnect(&sid("D")).await);

    assert_eq!(ticket.handle().wait_closed().await, SessionPhase::Closed);
    assert!(link.is_closed());
    assert_eq!(h.store.remove_attempts(), 1);
    assert_eq!(h.registry.live_count().await, 0);

    // The registry is usable again for the same id.
    h.registry
        .create_session(&sid("D"), SessionHandlers::new())
        .await
        .unwrap();
    let relink = h.next_link().await;
    relink.open().await;
    let handle = h.registry.ensure(&sid("D"), None).await.unwrap();
    handle.connected().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_without_session_survives_remove_failure() {
    let h = harness(FailingStore::new().failing_remove());

    assert!(!h.registry.disconnect(&sid("X")).await);

    assert_eq!(h.store.remove_attempts(), 1);
    assert_eq!(h.registry.live_count().await, 0);
}

#[tokio::test]
async fn test_failed_save_does_not_stop_events() {
    let mut h = harness(FailingStore::new().failing_save());
    let (recorder, mut seen) = Recorder::new();
    let ticket = h
        .registry
        .create_session(&sid("S"), SessionHandlers::new().with(recorder))
        .await
        .unwrap();
    let link = h.next_link().await;

    link.update_credentials(record()).await;
    link.qr("123").await;

    assert_eq!(
        ticket.first_credential().await.unwrap(),
        Some(CredentialPayload::new("img:123"))
    );
    assert_eq!(next_seen(&mut seen).await, Seen::Credential("img:123".into()));
    assert_eq!(h.store.save_attempts(), 1);
    assert_eq!(h.store.get(&sid("S")).await, None);

    link.open().await;
    ticket.completion().await.unwrap();
    assert_eq!(next_seen(&mut seen).await, Seen::Connected);
    assert_eq!(h.registry.status(&sid("S")).await, Some(SessionPhase::Connected));
}

#[tokio::test]
async fn test_failed_load_is_open_failed_without_live_entry() {
    let mut h = harness(FailingStore::new().failing_load());

    let error = h
        .registry
        .create_session(&sid("O"), SessionHandlers::new())
        .await
        .err()
        .unwrap();

    assert_eq!(error.code(), "open-failed");
    assert!(error.to_string().contains("corrupt"));
    assert_eq!(h.registry.live_count().await, 0);
    assert_eq!(h.registry.status(&sid("O")).await, None);
    assert_eq!(h.connector.connect_count(), 0);
    assert!(h.no_new_link());
}
