//! Disconnect status codes reported by the socket library.
//!
//! The socket attaches a numeric status to every close event. The values
//! follow HTTP conventions loosely (401 = logged out, 408 = timed out) and
//! are exposed here as named constants so the classifier can match on
//! names instead of magic numbers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A numeric disconnect status code.
///
/// Newtype over `i64` so a status can't be confused with any other number
/// floating around a disconnect payload. Deriving `PartialEq + Eq` lets the
/// associated constants be used directly as `match` patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i64);

impl StatusCode {
    /// The remote device revoked the link.
    pub const LOGGED_OUT: Self = Self(401);
    /// The account is not allowed to connect.
    pub const FORBIDDEN: Self = Self(403);
    /// The socket gave up waiting for the server.
    pub const TIMED_OUT: Self = Self(408);
    /// Same wire value as [`Self::TIMED_OUT`]; the library reports a lost
    /// connection with 408 too.
    pub const CONNECTION_LOST: Self = Self(408);
    /// The multi-device protocol version does not match.
    pub const MULTIDEVICE_MISMATCH: Self = Self(411);
    /// The server closed the stream.
    pub const CONNECTION_CLOSED: Self = Self(428);
    /// Another client opened a session for the same account.
    pub const CONNECTION_REPLACED: Self = Self(440);
    /// The stored credentials are unusable.
    pub const BAD_SESSION: Self = Self(500);
    /// The server is temporarily unavailable.
    pub const UNAVAILABLE_SERVICE: Self = Self(503);
    /// The server asked the client to reconnect (sent right after pairing).
    pub const RESTART_REQUIRED: Self = Self(515);

    /// Returns the raw numeric value.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for StatusCode {
    fn from(code: i64) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_constants_match_in_patterns() {
        let code = StatusCode(515);
        let name = match code {
            StatusCode::LOGGED_OUT => "logged-out",
            StatusCode::RESTART_REQUIRED => "restart-required",
            _ => "other",
        };
        assert_eq!(name, "restart-required");
    }

    #[test]
    fn test_status_code_lost_and_timed_out_share_value() {
        assert_eq!(StatusCode::CONNECTION_LOST, StatusCode::TIMED_OUT);
    }

    #[test]
    fn test_status_code_serializes_as_bare_number() {
        let json = serde_json::to_string(&StatusCode::CONNECTION_CLOSED).unwrap();
        assert_eq!(json, "428");
    }
}
