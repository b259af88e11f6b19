//! End-to-end tests through the `Pairlink` facade with the in-memory
//! channel socket.

use pairlink::prelude::*;
use pairlink_socket::{ChannelConnector, RemoteLink};
use serde_json::json;
use tokio::sync::mpsc;

struct Setup {
    pairlink: Pairlink<ChannelConnector, MemoryCredentialStore>,
    connector: ChannelConnector,
    store: Arc<MemoryCredentialStore>,
    links: mpsc::UnboundedReceiver<RemoteLink>,
}

fn setup() -> Setup {
    let (connector, links) = ChannelConnector::new();
    let store = Arc::new(MemoryCredentialStore::new());
    let pairlink = Pairlink::<ChannelConnector, MemoryCredentialStore>::builder().build(connector.clone(), Arc::clone(&store));
    Setup {
        pairlink,
        connector,
        store,
        links,
    }
}

async fn connected(s: &mut Setup, id: &str) -> RemoteLink {
    let ticket = s
        .pairlink
        .create_session(id, SessionHandlers::new())
        .await
        .unwrap();
    let link = s.links.recv().await.unwrap();
    link.open().await;
    ticket.completion().await.unwrap();
    link
}

#[tokio::test]
async fn test_start_refuses_connected_instance() {
    let mut s = setup();
    let link = connected(&mut s, "a").await;

    let error = s
        .pairlink
        .start("a", SessionHandlers::new())
        .await
        .err()
        .unwrap();

    assert_eq!(error.code(), "already-connected");
    assert!(!link.is_closed());
    assert_eq!(s.connector.connect_count(), 1);
}

#[tokio::test]
async fn test_start_regenerates_pending_instance() {
    let mut s = setup();
    s.pairlink
        .create_session("a", SessionHandlers::new())
        .await
        .unwrap();
    let first = s.links.recv().await.unwrap();

    let ticket = s.pairlink.start("a", SessionHandlers::new()).await.unwrap();
    let second = s.links.recv().await.unwrap();
    second.qr("2@fresh").await;

    assert!(first.is_closed());
    assert_eq!(
        ticket.first_credential().await.unwrap(),
        Some(CredentialPayload::new("2@fresh"))
    );
}

#[tokio::test]
async fn test_send_message_normalizes_phone_recipient() {
    let mut s = setup();
    let mut link = connected(&mut s, "a").await;

    s.pairlink
        .send_message("a", "+52 1 55 1234 5678", "hola", SendOptions::none())
        .await
        .unwrap();

    let sent = link.next_sent().await.unwrap();
    assert_eq!(sent.jid.as_str(), "5215512345678@s.whatsapp.net");
    assert_eq!(sent.content.as_value(), &json!({ "text": "hola" }));
}

#[tokio::test]
async fn test_send_message_structured_content_passes_through() {
    let mut s = setup();
    let mut link = connected(&mut s, "a").await;
    let content = json!({ "image": { "url": "https://example.com/a.png" }, "caption": "hi" });

    s.pairlink
        .send_message("a", "120363@g.us", content.clone(), SendOptions::none())
        .await
        .unwrap();

    let sent = link.next_sent().await.unwrap();
    assert_eq!(sent.jid.as_str(), "120363@g.us");
    assert_eq!(sent.content.as_value(), &content);
}

#[tokio::test]
async fn test_send_message_invalid_recipient_never_touches_session() {
    let s = setup();

    let error = s
        .pairlink
        .send_message("a", "  ", "hola", SendOptions::none())
        .await
        .unwrap_err();

    assert_eq!(error.code(), "jid-required");
    assert_eq!(s.connector.connect_count(), 0);
}

#[tokio::test]
async fn test_request_pairing_code_checks_pending_before_phone() {
    let s = setup();

    let error = s.pairlink.request_pairing_code("a", None).await.unwrap_err();

    assert_eq!(error.code(), "pairing-not-pending");
}

#[tokio::test]
async fn test_request_pairing_code_blank_phone_is_missing() {
    let mut s = setup();
    s.pairlink
        .create_session("a", SessionHandlers::new())
        .await
        .unwrap();
    let _link = s.links.recv().await.unwrap();

    let error = s
        .pairlink
        .request_pairing_code("a", Some("   "))
        .await
        .unwrap_err();

    assert_eq!(error.code(), "pairing-phone-missing");
    assert!(error.user_message().contains("phone number"));
}

#[tokio::test]
async fn test_request_pairing_code_strips_formatting() {
    let mut s = setup();
    s.pairlink
        .create_session("a", SessionHandlers::new())
        .await
        .unwrap();
    let link = s.links.recv().await.unwrap();
    link.set_pairing_code("WXYZ9876");

    let code = s
        .pairlink
        .request_pairing_code("a", Some("+52 (155) 1234-5678"))
        .await
        .unwrap();

    assert_eq!(code.as_str(), "WXYZ9876");
}

#[tokio::test]
async fn test_disconnect_session_erases_credentials() {
    let mut s = setup();
    let link = connected(&mut s, "a").await;
    s.store
        .insert("a", CredentialRecord::new(json!({ "me": "1" })))
        .await;

    assert!(s.pairlink.disconnect_session("a").await);

    assert_eq!(s.store.get(&SessionId::from("a")).await, None);
    assert_eq!(s.pairlink.status("a").await, None);
    assert!(link.is_closed());
}

#[tokio::test]
async fn test_end_session_then_start_resumes_without_pairing() {
    let mut s = setup();
    s.store
        .insert("a", CredentialRecord::new(json!({ "me": "1" })))
        .await;
    connected(&mut s, "a").await;

    assert!(s.pairlink.end_session("a").await);
    let ticket = s.pairlink.start("a", SessionHandlers::new()).await.unwrap();
    let link = s.links.recv().await.unwrap();

    assert!(link.credentials().is_some());
    link.open().await;
    assert_eq!(ticket.first_credential().await.unwrap(), None);
    assert_eq!(s.pairlink.status("a").await, Some(SessionPhase::Connected));
}

#[tokio::test]
async fn test_disconnect_then_start_pairs_again() {
    let mut s = setup();
    s.store
        .insert("a", CredentialRecord::new(json!({ "me": "1" })))
        .await;
    connected(&mut s, "a").await;

    assert!(s.pairlink.disconnect_session("a").await);
    let ticket = s.pairlink.start("a", SessionHandlers::new()).await.unwrap();
    let link = s.links.recv().await.unwrap();

    assert!(link.credentials().is_none());
    link.qr("2@again").await;
    assert_eq!(
        ticket.first_credential().await.unwrap(),
        Some(CredentialPayload::new("2@again"))
    );
}
