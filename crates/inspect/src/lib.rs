//! Inspection engine contract for Rampart.
//!
//! The WAF middleware never evaluates rules itself. It feeds request and
//! response data into an [`Engine`]'s per-request [`Session`] phase by phase
//! and enforces whatever [`Verdict`] comes back. This crate defines that seam:
//!
//! - [`Engine`] / [`EngineCapabilities`] / [`SessionMode`]: session creation
//! - [`Session`]: phase evaluation, body buffering and lifecycle
//! - [`Verdict`] / [`Action`]: the decision artifact produced by a phase
//! - [`InspectError`]: collaborator failures, distinct from blocking verdicts

pub mod errors;
pub mod headers;
pub mod session;
pub mod verdict;

pub use errors::{InspectError, InspectResult};
pub use session::{BodyProgress, BoxBodyReader, Engine, EngineCapabilities, Session, SessionMode};
pub use verdict::{Action, Verdict};

pub use rampart_common::TransactionId;
