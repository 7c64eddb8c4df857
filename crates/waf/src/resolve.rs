//! Verdict to status resolution.
//!
//! Every place that turns a verdict into a status line goes through
//! [`StatusPolicy::resolve`], on the request path and the response path alike.

use http::StatusCode;
use rampart_inspect::Verdict;
use tracing::warn;

/// Status used for a blocking verdict that carries no explicit status.
pub const DEFAULT_DENY_STATUS: StatusCode = StatusCode::FORBIDDEN;

/// Status-code policy applied to verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    default_deny: StatusCode,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            default_deny: DEFAULT_DENY_STATUS,
        }
    }
}

impl StatusPolicy {
    /// Policy with a custom default denial status.
    pub fn new(default_deny: StatusCode) -> Self {
        Self { default_deny }
    }

    /// Status for a blocking verdict without explicit status.
    pub fn default_deny(&self) -> StatusCode {
        self.default_deny
    }

    /// Map a verdict to the status the client must observe.
    ///
    /// - blocking action with explicit status: that status
    /// - blocking action without explicit status: the default denial status
    /// - any other action: `fallback`, unchanged
    ///
    /// An explicit status outside the valid HTTP range is treated as absent.
    pub fn resolve(&self, verdict: &Verdict, fallback: StatusCode) -> StatusCode {
        if !verdict.action.is_blocking() {
            return fallback;
        }

        match verdict.explicit_status() {
            None => self.default_deny,
            Some(code) => StatusCode::from_u16(code).unwrap_or_else(|_| {
                warn!(
                    status = code,
                    rule_id = ?verdict.rule_id,
                    "Verdict carries an invalid status, using default denial status"
                );
                self.default_deny
            }),
        }
    }
}

/// Resolve with the default policy (403 for statusless denials).
#[inline]
pub fn resolve_status(verdict: &Verdict, fallback: StatusCode) -> StatusCode {
    StatusPolicy::default().resolve(verdict, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rampart_inspect::Action;

    #[test]
    fn test_deny_without_status_is_403() {
        let status = resolve_status(&Verdict::deny(), StatusCode::OK);
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_deny_with_explicit_status() {
        let status = resolve_status(&Verdict::deny().with_status(429), StatusCode::OK);
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_non_blocking_keeps_fallback() {
        let verdict = Verdict::new(Action::Redirect).with_status(302);
        assert_eq!(resolve_status(&verdict, StatusCode::OK), StatusCode::OK);

        let verdict = Verdict::new(Action::Drop);
        assert_eq!(
            resolve_status(&verdict, StatusCode::ACCEPTED),
            StatusCode::ACCEPTED
        );
    }

    #[test]
    fn test_invalid_explicit_status_uses_default() {
        let verdict = Verdict::deny().with_status(1200);
        assert_eq!(resolve_status(&verdict, StatusCode::OK), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_custom_default_deny() {
        let policy = StatusPolicy::new(StatusCode::NOT_ACCEPTABLE);
        assert_eq!(
            policy.resolve(&Verdict::deny(), StatusCode::OK),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            policy.resolve(&Verdict::deny().with_status(451), StatusCode::OK),
            StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS
        );
    }

    proptest! {
        #[test]
        fn prop_explicit_valid_status_wins(code in 100u16..=999, fallback in 100u16..=599) {
            let fallback = StatusCode::from_u16(fallback).unwrap();
            let verdict = Verdict::deny().with_status(code);
            prop_assert_eq!(resolve_status(&verdict, fallback).as_u16(), code);
        }

        #[test]
        fn prop_non_blocking_never_changes_status(
            action in "[a-z]{1,8}",
            status in proptest::option::of(100u16..=999),
            fallback in 100u16..=599,
        ) {
            prop_assume!(action != "deny");
            let fallback = StatusCode::from_u16(fallback).unwrap();
            let verdict = Verdict { status, ..Verdict::new(action.as_str()) };
            prop_assert_eq!(resolve_status(&verdict, fallback), fallback);
        }
    }
}
