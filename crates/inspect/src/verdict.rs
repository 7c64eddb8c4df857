//! Verdict types.
//!
//! A verdict (the engine calls it an interruption) is produced by any phase
//! evaluation that decides normal processing must stop. Its presence alone
//! halts forward progress on that direction of traffic; the action and
//! optional status only decide how the exchange is terminated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Disruptive action carried by a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// Terminate the exchange with an error status
    Deny,
    /// Close the connection
    Drop,
    /// Send the client elsewhere
    Redirect,
    /// Stop evaluating and let the exchange through
    Allow,
    /// Engine specific action this crate does not know about
    Other(String),
}

impl Action {
    /// Whether this action mandates terminating the exchange with an error status.
    #[inline]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Action::Deny)
    }

    /// The engine's spelling of the action.
    pub fn as_str(&self) -> &str {
        match self {
            Action::Deny => "deny",
            Action::Drop => "drop",
            Action::Redirect => "redirect",
            Action::Allow => "allow",
            Action::Other(s) => s,
        }
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "deny" => Action::Deny,
            "drop" => Action::Drop,
            "redirect" => Action::Redirect,
            "allow" => Action::Allow,
            other => Action::Other(other.to_string()),
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        match s.as_str() {
            "deny" | "drop" | "redirect" | "allow" => Action::from(s.as_str()),
            _ => Action::Other(s),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable decision artifact produced by a phase evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Disruptive action
    pub action: Action,
    /// Explicit HTTP status, if the rule set one
    #[serde(default)]
    pub status: Option<u16>,
    /// Id of the rule that produced the verdict
    #[serde(default)]
    pub rule_id: Option<u32>,
    /// Opaque action data (redirect target, message, ...)
    #[serde(default)]
    pub data: String,
}

impl Verdict {
    /// Create a verdict with the given action and no explicit status.
    pub fn new(action: impl Into<Action>) -> Self {
        Self {
            action: action.into(),
            status: None,
            rule_id: None,
            data: String::new(),
        }
    }

    /// Create a deny verdict without explicit status.
    pub fn deny() -> Self {
        Self::new(Action::Deny)
    }

    /// Set the explicit status. `0` means "no explicit status".
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = (status != 0).then_some(status);
        self
    }

    /// Set the originating rule id.
    pub fn with_rule_id(mut self, rule_id: u32) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    /// Attach opaque action data.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// Explicit status, normalizing `0` to absent.
    #[inline]
    pub fn explicit_status(&self) -> Option<u16> {
        self.status.filter(|s| *s != 0)
    }
}
