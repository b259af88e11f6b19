use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pairlink::prelude::*;
use pairlink::session::encoder_fn;
use pairlink_socket::{ChannelConnector, RemoteLink};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// Simulated network
// ---------------------------------------------------------------------------

fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Plays the messaging network for one socket.
///
/// A socket opened without credentials pairs: it shows a QR code, issues
/// credentials and then asks for a restart (status 515), the way the real
/// network does right after a device is linked. A socket opened with
/// credentials connects straight away and echoes what it is asked to send.
async fn simulate(mut link: RemoteLink) {
    link.set_pairing_code(random_string(8).to_uppercase());

    if link.credentials().is_none() {
        let raw = format!("2@{},{}", random_string(24), random_string(12));
        link.qr(&raw).await;
        tokio::time::sleep(Duration::from_millis(400)).await;

        let me = format!("52155{}@s.whatsapp.net", rand::rng().random_range(10_000_000..99_999_999));
        link.update_credentials(CredentialRecord::new(json!({ "me": { "id": me } })))
            .await;
        link.close_with(json!({ "error": { "output": { "statusCode": 515 } } }))
            .await;
        return;
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    link.open().await;
    while let Some(sent) = link.next_sent().await {
        tracing::info!(
            socket = link.serial(),
            to = %sent.jid,
            content = %sent.content.as_value(),
            "network delivered message"
        );
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

struct ConsoleHandler;

impl SessionHandler for ConsoleHandler {
    fn on_credential<'a>(
        &'a self,
        id: &'a SessionId,
        credential: &'a CredentialPayload,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        async move {
            tracing::info!(session_id = %id, qr = %credential, "scan this code to link");
            Ok(())
        }
        .boxed()
    }

    fn on_connected<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<(), HandlerError>> {
        async move {
            tracing::info!(session_id = %id, "instance ready to send");
            Ok(())
        }
        .boxed()
    }

    fn on_close<'a>(
        &'a self,
        id: &'a SessionId,
        event: &'a CloseEvent,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        async move {
            tracing::info!(session_id = %id, kind = event.kind(), "instance closed");
            Ok(())
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pairlink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (connector, mut links) = ChannelConnector::new();
    tokio::spawn(async move {
        while let Some(link) = links.recv().await {
            tokio::spawn(simulate(link));
        }
    });

    let store = Arc::new(MemoryCredentialStore::new());
    let pairlink = Pairlink::<ChannelConnector, MemoryCredentialStore>::builder()
        .encoder(encoder_fn(|raw: &str| {
            Ok(CredentialPayload::new(format!("[qr {} chars] {raw}", raw.len())))
        }))
        .build(connector, Arc::clone(&store));

    let tenant = SessionId::from("tenant-1");
    let ticket = pairlink
        .create_session(&tenant, SessionHandlers::new().with(ConsoleHandler))
        .await?;

    if let Some(qr) = ticket.first_credential().await? {
        tracing::info!(qr = %qr, "first credential ready");
    }
    match pairlink.request_pairing_code(&tenant, Some("+52 155 1234 5678")).await {
        Ok(code) => tracing::info!(code = %code.grouped(), "pairing code issued"),
        Err(e) => tracing::warn!(error = %e, user_message = e.user_message(), "no pairing code"),
    }

    // Pairing ends with a restart; the ticket's attempt is superseded and
    // the registry reconnects with the freshly stored credentials.
    if let Err(e) = ticket.completion().await {
        tracing::info!(code = e.code(), "first attempt did not connect");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    let handle = pairlink.ensure(&tenant, None).await?;
    handle.connected().await?;

    let receipt = pairlink
        .send_message(&tenant, "+52 1 55 8765 4321", "Hello from Pairlink", SendOptions::none())
        .await?;
    tracing::info!(receipt = %receipt.as_value(), "message accepted");

    match pairlink.send_message(&tenant, "   ", "nobody", SendOptions::none()).await {
        Ok(_) => tracing::warn!("blank recipient accepted"),
        Err(e) => tracing::info!(code = e.code(), user_message = e.user_message(), "send refused"),
    }

    pairlink.disconnect_session(&tenant).await;
    tracing::info!(
        credentials_left = store.get(&tenant).await.is_some(),
        "instance logged out"
    );
    Ok(())
}
