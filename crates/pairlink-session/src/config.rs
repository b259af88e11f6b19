//! Session configuration and lifecycle phases.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing and buffering knobs shared by every session of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a fresh session may go without producing a pairing
    /// credential (or connecting) before it is torn down.
    pub credential_timeout: Duration,

    /// How long `send_message` waits for a pending session to connect.
    pub connection_timeout: Duration,

    /// Capacity of each session actor's command channel.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(20),
            command_buffer: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Where one session attempt is in its lifecycle.
///
/// ```text
/// AwaitingCredential → Connected → Closed
///         └──────────────┴──→ Restarting
/// ```
///
/// - **AwaitingCredential**: the socket is open and the handshake has not
///   completed. A QR code or pairing code may be shown to the user.
/// - **Connected**: the handshake completed; messages can be sent.
/// - **Restarting**: this attempt was torn down by a transient close and a
///   fresh attempt for the same id takes over. Final for this attempt.
/// - **Closed**: torn down for good (timeout, terminal close, end,
///   disconnect, or replaced by a new `create_session`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    AwaitingCredential,
    Connected,
    Restarting,
    Closed,
}

impl SessionPhase {
    /// Returns `true` while a pairing code may be requested.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::AwaitingCredential)
    }

    /// Returns `true` once the handshake completed.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` once this attempt will never process another event.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Restarting | Self::Closed)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingCredential => write!(f, "AwaitingCredential"),
            Self::Connected => write!(f, "Connected"),
            Self::Restarting => write!(f, "Restarting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
