//! Well-known header names the middleware injects into or rewrites for the engine.
//!
//! The engine's rules operate on a header view, so these must use the exact
//! canonical spelling rules expect.

/// Request host. Reintroduced as a synthetic request header.
pub const HOST: &str = "Host";

/// Transfer coding of the request body. Reintroduced as a synthetic request header.
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";

/// Inbound request id, reused as the transaction id when present.
pub const X_REQUEST_ID: &str = "X-Request-Id";
