//! Engine and session traits.
//!
//! An [`Engine`] is long lived and shared by every request. A [`Session`] is
//! created once per request and must be finalized with
//! [`Session::process_logging`] and released with [`Session::close`] exactly
//! once, whatever path the request takes.

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::errors::InspectResult;
use crate::verdict::Verdict;
use rampart_common::TransactionId;

/// Boxed body stream handed between the engine and the middleware.
pub type BoxBodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Capabilities an engine advertises at session-creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCapabilities {
    /// The engine can bind a session to the request's cancellation signal
    pub context_aware: bool,
}

/// How a new session relates to the request's lifetime.
#[derive(Debug, Clone, Default)]
pub enum SessionMode {
    /// The session knows nothing about the request's cancellation
    #[default]
    Detached,
    /// The session observes the request's cancellation signal
    Bound(CancellationToken),
}

impl SessionMode {
    /// The bound cancellation token, if any.
    pub fn token(&self) -> Option<&CancellationToken> {
        match self {
            SessionMode::Detached => None,
            SessionMode::Bound(token) => Some(token),
        }
    }
}

/// Progress report of a body buffering operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyProgress {
    /// Verdict raised while buffering, if any
    pub verdict: Option<Verdict>,
    /// Bytes accepted into the session's buffer
    pub handled: u64,
}

impl BodyProgress {
    /// Progress without a verdict.
    pub fn handled(handled: u64) -> Self {
        Self {
            verdict: None,
            handled,
        }
    }

    /// Progress that ended in a verdict.
    pub fn interrupted(verdict: Verdict, handled: u64) -> Self {
        Self {
            verdict: Some(verdict),
            handled,
        }
    }
}

/// Factory for inspection sessions.
pub trait Engine: Send + Sync {
    /// Capabilities checked once per session creation.
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities::default()
    }

    /// Create a session for one request.
    ///
    /// The middleware only passes [`SessionMode::Bound`] when
    /// [`EngineCapabilities::context_aware`] is set.
    fn new_session(&self, id: TransactionId, mode: SessionMode) -> Box<dyn Session>;
}

/// Per-request handle to the inspection engine.
///
/// Phases must be driven in order: connection, URI, request headers, request
/// body, response headers, response body, logging. Any phase may return a
/// [`Verdict`]; once one is returned the session reports it as a standing
/// interruption through [`Session::interruption`].
#[async_trait]
pub trait Session: Send {
    /// Transaction id the session was created with.
    fn id(&self) -> &TransactionId;

    /// Rule evaluation is disabled; the middleware should not intercept at all.
    fn is_rule_engine_off(&self) -> bool;

    /// The standing verdict, if a phase already produced one.
    fn interruption(&self) -> Option<&Verdict>;

    /// Whether a verdict is standing.
    fn is_interrupted(&self) -> bool {
        self.interruption().is_some()
    }

    // Request side

    /// Connection phase. A `None` client port means the port is unknown.
    fn process_connection(
        &mut self,
        client: &str,
        client_port: Option<u16>,
        server: &str,
        server_port: Option<u16>,
    ) -> Option<Verdict>;

    /// URI phase.
    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) -> Option<Verdict>;

    /// Stage one request header value. Repeated names are staged once per value.
    ///
    /// Values are the raw bytes the client sent, not necessarily UTF-8.
    fn add_request_header(&mut self, name: &str, value: &[u8]);

    /// Server name the request was addressed to, as raw bytes.
    fn set_server_name(&mut self, name: &[u8]);

    /// Request headers phase over every staged header.
    fn process_request_headers(&mut self) -> Option<Verdict>;

    /// Whether the request body must be buffered for inspection.
    fn is_request_body_accessible(&self) -> bool;

    /// Buffer the request body from `body`, stopping at the session's limit.
    ///
    /// Bytes past the limit are left unread in `body`.
    async fn read_request_body_from(
        &mut self,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> InspectResult<BodyProgress>;

    /// Release the buffered request body prefix for the downstream handler.
    fn request_body_reader(&mut self) -> InspectResult<BoxBodyReader>;

    /// Request body phase.
    fn process_request_body(&mut self) -> InspectResult<Option<Verdict>>;

    // Response side

    /// Stage one response header value, as raw bytes.
    fn add_response_header(&mut self, name: &str, value: &[u8]);

    /// Response headers phase.
    fn process_response_headers(&mut self, status: u16, protocol: &str) -> Option<Verdict>;

    /// Whether the response body must be buffered for inspection.
    fn is_response_body_accessible(&self) -> bool;

    /// Whether the response body's content type is one the engine processes.
    fn is_response_body_processable(&self) -> bool;

    /// Append response bytes to the session's buffer.
    async fn write_response_body(&mut self, buf: &[u8]) -> InspectResult<BodyProgress>;

    /// Response body phase over the buffered body.
    fn process_response_body(&mut self) -> InspectResult<Option<Verdict>>;

    /// Release the buffered response body for delivery to the client.
    fn response_body_reader(&mut self) -> InspectResult<BoxBodyReader>;

    // Lifecycle

    /// Logging phase. Runs once per request.
    fn process_logging(&mut self);

    /// Free engine-side resources (temporary body storage). Runs once per request.
    fn close(&mut self) -> InspectResult<()>;
}
