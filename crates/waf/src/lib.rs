//! Rampart WAF middleware.
//!
//! An interception layer that sits between a server's routing and the
//! application handlers. Both directions of traffic are fed to an inspection
//! engine (see `rampart-inspect`) and its verdicts are enforced on the live
//! exchange:
//!
//! - **Request phases**: connection, URI, headers and body are evaluated in
//!   order; a verdict answers the request without running the handler
//! - **Response interception**: the status line is deferred until no verdict
//!   can override it any more, and inspected bodies are buffered so a block
//!   never leaks a byte
//! - **Exactly-once status**: whatever happens, the client sees one status
//!   line, with verdict header rewrites applied before it
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rampart_waf::{Waf, ResponseRecorder, Request};
//!
//! let waf = Arc::new(Waf::new(my_engine));
//! let app = waf.wrap(my_handler);
//!
//! let mut writer = ResponseRecorder::new();
//! let mut req = Request::new(http::Method::GET, "/".parse()?);
//! app.call(&mut writer, &mut req).await;
//! let response = writer.into_response();
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod buffer_pool;
pub mod config;
pub mod errors;
pub mod interceptor;
pub mod pool;
pub mod recorder;
pub mod request;
pub mod resolve;
pub mod response;
pub mod waf;
pub mod writer;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Entry point
pub use waf::{Handler, Intercepted, Waf};

// Configuration and errors
pub use config::WafConfig;
pub use errors::{ConfigError, InterceptError, WriterError};

// Phase drivers
pub use request::{process_request, BoxBufBodyReader, Request, RequestBody};
pub use response::process_response;

// Verdict resolution
pub use resolve::{resolve_status, StatusPolicy, DEFAULT_DENY_STATUS};

// Response interception
pub use interceptor::{InterceptorState, ResponseInterceptor};
pub use pool::{InterceptorPool, PooledInterceptor};
pub use recorder::ResponseRecorder;
pub use writer::{BodyWriter, HijackedConnection, PushOptions, ResponseWriter, WriteOnly};

// Engine contract
pub use rampart_inspect::{Action, Engine, InspectError, Session, SessionMode, Verdict};
