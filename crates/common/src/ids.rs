//! Transaction identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one inspection transaction.
///
/// A transaction spans exactly one HTTP exchange. The id is handed to the
/// inspection engine when the session is created and is attached to every
/// log line emitted while the exchange is in flight, so engine-side audit
/// records and middleware logs can be joined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Mint a random id (UUID v4).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuse a client-supplied request id when it is usable, otherwise mint one.
    ///
    /// Ids longer than 128 bytes or containing anything but visible ASCII are
    /// replaced so they cannot smuggle control characters into logs.
    pub fn from_header_or_new(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() && v.len() <= 128 && v.bytes().all(|b| b.is_ascii_graphic()) => {
                Self(v.to_string())
            }
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
