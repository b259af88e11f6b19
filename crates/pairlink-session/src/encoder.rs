//! Rendering pairing strings.
//!
//! The socket issues raw pairing strings; what the user scans is an image
//! (or a data URI) produced by an external QR encoder, modelled by
//! [`CredentialEncoder`]. Encoding may fail and may suspend; a renderer
//! that does CPU-heavy work should move it to `spawn_blocking` rather than
//! stall the session's task.

use std::fmt;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};

use crate::RenderError;

/// A rendered pairing credential, ready to show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialPayload(String);

impl CredentialPayload {
    /// Wraps an already-rendered payload.
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    /// Returns the payload as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwraps the payload.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders a raw pairing string into a [`CredentialPayload`].
pub trait CredentialEncoder: Send + Sync + 'static {
    /// Encodes `raw`. A failure tears the session down.
    fn encode<'a>(&'a self, raw: &'a str) -> BoxFuture<'a, Result<CredentialPayload, RenderError>>;
}

/// Passes the raw pairing string through unchanged.
///
/// The default when no encoder is configured: the caller renders the QR
/// code itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEncoder;

impl CredentialEncoder for RawEncoder {
    fn encode<'a>(&'a self, raw: &'a str) -> BoxFuture<'a, Result<CredentialPayload, RenderError>> {
        let rendered = if raw.is_empty() {
            Err(RenderError("empty pairing string".to_string()))
        } else {
            Ok(CredentialPayload::new(raw))
        };
        future::ready(rendered).boxed()
    }
}

/// An encoder backed by a synchronous closure. Built with [`encoder_fn`].
pub struct FnEncoder<F>(F);

impl<F> CredentialEncoder for FnEncoder<F>
where
    F: Fn(&str) -> Result<CredentialPayload, RenderError> + Send + Sync + 'static,
{
    fn encode<'a>(&'a self, raw: &'a str) -> BoxFuture<'a, Result<CredentialPayload, RenderError>> {
        future::ready((self.0)(raw)).boxed()
    }
}

/// Wraps a cheap synchronous closure as a [`CredentialEncoder`].
pub fn encoder_fn<F>(f: F) -> FnEncoder<F>
where
    F: Fn(&str) -> Result<CredentialPayload, RenderError> + Send + Sync + 'static,
{
    FnEncoder(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_raw_encoder_passes_through() {
        let payload = RawEncoder.encode("2@abc,def").await.unwrap();
        assert_eq!(payload.as_str(), "2@abc,def");
    }

    #[tokio::test]
    async fn test_raw_encoder_rejects_empty() {
        assert!(RawEncoder.encode("").await.is_err());
    }

    #[tokio::test]
    async fn test_encoder_fn_wraps_closure() {
        let encoder = encoder_fn(|raw| Ok(CredentialPayload::new(format!("img:{raw}"))));
        assert_eq!(encoder.encode("123").await.unwrap().as_str(), "img:123");
    }

    /// Renders on the blocking pool, like an image encoder would.
    struct BlockingEncoder;

    impl CredentialEncoder for BlockingEncoder {
        fn encode<'a>(
            &'a self,
            raw: &'a str,
        ) -> BoxFuture<'a, Result<CredentialPayload, RenderError>> {
            let raw = raw.to_string();
            async move {
                tokio::task::spawn_blocking(move || {
                    CredentialPayload::new(format!("png:{}:{raw}", raw.len()))
                })
                .await
                .map_err(|error| RenderError(error.to_string()))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_encoder_may_suspend() {
        let encoder: &dyn CredentialEncoder = &BlockingEncoder;

        let payload = encoder.encode("abc").await.unwrap();

        assert_eq!(payload.as_str(), "png:3:abc");
    }
}
