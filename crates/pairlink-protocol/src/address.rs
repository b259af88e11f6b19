//! Recipient and phone-number normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Server part appended to phone-number recipients.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// E.164 numbers have at most 15 digits; anything under 8 can't be a
/// full international number.
const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;

/// A normalized messaging address (`<user>@<server>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    /// Normalizes a recipient into a jid.
    ///
    /// A value that already contains `@` is kept as-is (after trimming)
    /// as long as both halves are non-empty; this covers user and group
    /// addresses alike. Anything else is treated as a phone number: every
    /// non-digit is dropped, leading zeros are stripped, and
    /// [`USER_SERVER`] is appended.
    pub fn parse(value: &str) -> Result<Self, ProtocolError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::JidRequired);
        }

        if let Some((user, server)) = trimmed.split_once('@') {
            if user.is_empty() || server.is_empty() {
                return Err(ProtocolError::InvalidJid(trimmed.to_string()));
            }
            return Ok(Self(trimmed.to_string()));
        }

        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Err(ProtocolError::InvalidJid(trimmed.to_string()));
        }

        Ok(Self(format!("{digits}@{USER_SERVER}")))
    }

    /// Returns the jid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@`.
    pub fn user(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(user, _)| user)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The dialable digits of a phone number (country code included, no `+`).
///
/// This is what the socket expects when asked for a pairing code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneDigits(String);

impl PhoneDigits {
    /// Extracts the digits from a human-entered phone number.
    ///
    /// Spaces, dashes, parentheses and a leading `+` are ignored.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::PhoneRequired);
        }

        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
            return Err(ProtocolError::InvalidPhone(trimmed.to_string()));
        }

        Ok(Self(digits))
    }

    /// Returns the digits as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The jid this phone number is reachable at.
    pub fn jid(&self) -> Jid {
        Jid(format!("{}@{USER_SERVER}", self.0))
    }

    /// The number in E.164 form (`+<digits>`).
    pub fn e164(&self) -> String {
        format!("+{}", self.0)
    }
}

impl fmt::Display for PhoneDigits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
