//! Disconnect classification.
//!
//! Every close event from the socket carries an opaque `lastDisconnect`
//! payload. Depending on which layer of the socket library produced it, the
//! numeric status can sit in one of several places:
//!
//! ```text
//! { "error": { "output": { "statusCode": 428 } } }            ← boom-style error
//! { "error": { "output": { "payload": { "statusCode": 428 } } } }
//! { "error": { "statusCode": 428 } }  { "error": { "code": "428" } }
//! { "statusCode": 428 }  { "code": 428 }                      ← bare payload
//! ```
//!
//! [`classify`] tries a fixed list of extractors in priority order; the
//! first field holding a number or a string wins. The status is then mapped
//! onto a [`DisconnectOutcome`] that says whether the credentials survive
//! and whether the session should reconnect on its own.

use pairlink_protocol::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Why a session's socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisconnectReason {
    /// The remote device revoked the link.
    LoggedOut,
    /// The server asked for a reconnect (typically right after pairing).
    RestartRequired,
    /// Another client took over the account.
    Replaced,
    /// The server dropped the stream.
    ConnectionClosed,
    /// The socket timed out waiting for the server.
    TimedOut,
    /// Missing, unparseable or unrecognized status.
    Unknown,
}

impl DisconnectReason {
    /// Kebab-case name, as used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoggedOut => "logged-out",
            Self::RestartRequired => "restart-required",
            Self::Replaced => "replaced",
            Self::ConnectionClosed => "connection-closed",
            Self::TimedOut => "timed-out",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The retry policy derived from one close event. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectOutcome {
    /// Classified reason.
    pub reason: DisconnectReason,
    /// The status that was extracted, if any.
    pub status_code: Option<StatusCode>,
    /// `false` only when the stored credentials must be erased.
    pub keep_credentials: bool,
    /// `true` when the session should reconnect without caller involvement.
    pub should_restart: bool,
}

impl DisconnectOutcome {
    /// Applies the policy table to an extracted status.
    pub fn from_status(status_code: Option<StatusCode>) -> Self {
        let (reason, keep_credentials, should_restart) = match status_code {
            Some(StatusCode::LOGGED_OUT) => (DisconnectReason::LoggedOut, false, false),
            Some(StatusCode::RESTART_REQUIRED) => {
                (DisconnectReason::RestartRequired, true, true)
            }
            Some(StatusCode::CONNECTION_REPLACED) => (DisconnectReason::Replaced, true, false),
            Some(StatusCode::CONNECTION_CLOSED) => {
                (DisconnectReason::ConnectionClosed, true, true)
            }
            Some(StatusCode::TIMED_OUT) => (DisconnectReason::TimedOut, true, false),
            _ => (DisconnectReason::Unknown, true, false),
        };

        Self {
            reason,
            status_code,
            keep_credentials,
            should_restart,
        }
    }
}

impl std::fmt::Display for DisconnectOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{}, status {}", self.reason, code),
            None => write!(f, "{}", self.reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Which object an extractor looks into.
#[derive(Debug, Clone, Copy)]
enum Scope {
    /// `payload.error` when present and non-null, else the payload itself.
    Details,
    /// The payload itself.
    Root,
}

/// One typed extractor: a JSON pointer relative to a scope.
#[derive(Debug, Clone, Copy)]
struct Probe {
    scope: Scope,
    pointer: &'static str,
}

/// Extractors in priority order.
const PROBES: [Probe; 6] = [
    Probe { scope: Scope::Details, pointer: "/output/statusCode" },
    Probe { scope: Scope::Details, pointer: "/output/payload/statusCode" },
    Probe { scope: Scope::Details, pointer: "/statusCode" },
    Probe { scope: Scope::Details, pointer: "/code" },
    Probe { scope: Scope::Root, pointer: "/statusCode" },
    Probe { scope: Scope::Root, pointer: "/code" },
];

/// Classifies a close event's `lastDisconnect` payload.
pub fn classify(last_disconnect: Option<&Value>) -> DisconnectOutcome {
    DisconnectOutcome::from_status(extract_status(last_disconnect))
}

/// Finds the status code in a disconnect payload.
///
/// The first probed field that holds a number or a string decides the
/// result; if it doesn't parse as an integer the status is unknown, and
/// lower-priority fields are not consulted.
pub fn extract_status(last_disconnect: Option<&Value>) -> Option<StatusCode> {
    let root = last_disconnect?;
    let details = match root.get("error") {
        Some(error) if !error.is_null() => error,
        _ => root,
    };

    let raw = PROBES.iter().find_map(|probe| {
        let scope = match probe.scope {
            Scope::Details => details,
            Scope::Root => root,
        };
        scope
            .pointer(probe.pointer)
            .filter(|value| value.is_number() || value.is_string())
    })?;

    parse_status(raw)
}

fn parse_status(raw: &Value) -> Option<StatusCode> {
    let code = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    code.map(StatusCode)
}
