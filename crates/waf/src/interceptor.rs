//! Response interceptor.
//!
//! The interceptor stands in for the real response writer while the
//! downstream handler runs. It defers the status line so a verdict raised
//! while inspecting response headers or body can still replace it, and it
//! either buffers body bytes into the session or streams them straight
//! through when the body is not inspected.
//!
//! # States
//!
//! ```text
//! Unwritten --write_header--> HeaderRecorded --flush--> Flushed
//!     |                                                    ^
//!     +------------- verdict on response headers ----------+
//! ```
//!
//! Once the session carries a standing verdict the interceptor is absorbed
//! into an interrupted state: the resolved status has been flushed and every
//! later body write is discarded.
//!
//! Per-request storage lives in [`InterceptorState`], which the
//! [`InterceptorPool`](crate::pool::InterceptorPool) recycles between
//! requests. [`ResponseInterceptor`] binds one state to the request's real
//! writer and session for the duration of the handler call.

use async_trait::async_trait;
use http::header::{HeaderValue, CONTENT_LENGTH};
use http::{HeaderMap, StatusCode};
use std::io;
use std::panic::Location;
use std::time::Instant;
use tokio::io::AsyncRead;
use tracing::{debug, trace, warn};

use rampart_inspect::{Session, Verdict};

use crate::buffer_pool::{self, COPY_BUFFER_SIZE};
use crate::errors::WriterError;
use crate::resolve::StatusPolicy;
use crate::writer::{copy_buffer, BodyWriter, HijackedConnection, PushOptions, ResponseWriter, WriteOnly};

/// Per-request interceptor storage.
#[derive(Debug)]
pub struct InterceptorState {
    protocol: String,
    status: StatusCode,
    /// `None` until a header is recorded
    size: Option<u64>,
    header_flushed: bool,
    header_recorded: bool,
    policy: StatusPolicy,
    copy_buffer_size: usize,
}

impl Default for InterceptorState {
    fn default() -> Self {
        Self {
            protocol: String::new(),
            status: StatusCode::OK,
            size: None,
            header_flushed: false,
            header_recorded: false,
            policy: StatusPolicy::default(),
            copy_buffer_size: COPY_BUFFER_SIZE,
        }
    }
}

impl InterceptorState {
    /// Create a fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the state for a new request.
    ///
    /// The protocol string's allocation is kept.
    pub fn reset(&mut self, protocol: &str, policy: StatusPolicy, copy_buffer_size: usize) {
        self.protocol.clear();
        self.protocol.push_str(protocol);
        self.status = StatusCode::OK;
        self.size = None;
        self.header_flushed = false;
        self.header_recorded = false;
        self.policy = policy;
        self.copy_buffer_size = copy_buffer_size;
    }

    /// Drop everything tied to the previous request.
    pub(crate) fn clear(&mut self) {
        self.reset("", self.policy, self.copy_buffer_size);
    }

    /// Status recorded so far.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether a header has been recorded or flushed.
    pub fn written(&self) -> bool {
        self.size.is_some()
    }

    /// Body bytes accepted so far, `0` while nothing was written.
    pub fn size(&self) -> u64 {
        self.size.unwrap_or(0)
    }

    /// Protocol of the request being served.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Whether the status line went to the real writer.
    pub fn is_header_flushed(&self) -> bool {
        self.header_flushed
    }

    /// Whether a status was recorded without a verdict.
    pub fn is_header_recorded(&self) -> bool {
        self.header_recorded
    }

    pub(crate) fn copy_buffer_size(&self) -> usize {
        self.copy_buffer_size
    }
}

/// Decorator around the real response writer for one request.
pub struct ResponseInterceptor<'a> {
    pub(crate) writer: &'a mut dyn ResponseWriter,
    pub(crate) session: &'a mut dyn Session,
    pub(crate) state: &'a mut InterceptorState,
}

impl<'a> ResponseInterceptor<'a> {
    /// Bind a reset state to the request's writer and session.
    pub fn new(
        state: &'a mut InterceptorState,
        writer: &'a mut dyn ResponseWriter,
        session: &'a mut dyn Session,
    ) -> Self {
        Self {
            writer,
            session,
            state,
        }
    }

    /// Status recorded after `write` and `write_header`.
    pub fn status(&self) -> StatusCode {
        self.state.status()
    }

    /// Whether the response has been written.
    pub fn written(&self) -> bool {
        self.state.written()
    }

    /// Size of the written response.
    pub fn size(&self) -> u64 {
        self.state.size()
    }

    /// Replace the recorded status.
    pub(crate) fn override_status(&mut self, status: StatusCode) {
        self.state.status = status;
        self.state.size = Some(0);
    }

    /// Send the recorded status to the real writer, at most once.
    pub(crate) fn flush_header(&mut self) {
        if !self.state.header_flushed {
            trace!(status = self.state.status.as_u16(), "Flushing status line");
            self.writer.write_header(self.state.status);
            self.state.header_flushed = true;
        }
    }

    /// Replace the response with an empty one carrying the verdict's status.
    ///
    /// Header mutations happen before the flush so they reach the wire.
    pub(crate) fn blank_response(&mut self, verdict: &Verdict) {
        let headers = self.writer.headers_mut();
        headers.clear();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

        let status = self.state.policy.resolve(verdict, self.state.status);
        debug!(
            action = %verdict.action,
            rule_id = ?verdict.rule_id,
            status = status.as_u16(),
            "Response interrupted by verdict"
        );
        self.override_status(status);
        self.flush_header();
    }

    fn body_is_inspected(&self) -> bool {
        self.session.is_response_body_accessible() && self.session.is_response_body_processable()
    }
}

#[async_trait]
impl BodyWriter for ResponseInterceptor<'_> {
    /// Buffer the body into the session when it is inspected, otherwise write
    /// it straight through after flushing the status line.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.session.is_interrupted() {
            // Status already flushed by whichever step raised the verdict.
            return Ok(0);
        }

        if !self.state.header_recorded {
            self.write_header(StatusCode::OK);
            if self.session.is_interrupted() {
                return Ok(0);
            }
        }

        if self.body_is_inspected() {
            let progress = self
                .session
                .write_response_body(buf)
                .await
                .map_err(io::Error::other)?;
            if let Some(verdict) = progress.verdict {
                self.blank_response(&verdict);
                return Ok(0);
            }
            let n = progress.handled as usize;
            self.state.size = Some(self.state.size() + progress.handled);
            return Ok(n);
        }

        self.flush_header();
        let n = self.writer.write(buf).await?;
        self.state.size = Some(self.state.size() + n as u64);
        Ok(n)
    }
}

#[async_trait]
impl ResponseWriter for ResponseInterceptor<'_> {
    fn headers(&self) -> &HeaderMap {
        self.writer.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.writer.headers_mut()
    }

    /// Record the status line without sending it.
    ///
    /// Staged headers are handed to the session and the response headers
    /// phase runs. A verdict blanks the response and flushes its status
    /// immediately; otherwise the status stays deferred.
    #[track_caller]
    fn write_header(&mut self, status: StatusCode) {
        if self.state.header_recorded || self.state.header_flushed {
            let caller = Location::caller();
            warn!(
                status = status.as_u16(),
                recorded = self.state.status.as_u16(),
                caller.file = caller.file(),
                caller.line = caller.line(),
                "Superfluous write_header call ignored"
            );
            return;
        }

        for (name, value) in self.writer.headers().iter() {
            self.session.add_response_header(name.as_str(), value.as_bytes());
        }

        self.state.status = status;
        self.state.size = Some(0);
        if let Some(verdict) = self
            .session
            .process_response_headers(status.as_u16(), &self.state.protocol)
        {
            self.blank_response(&verdict);
            return;
        }

        self.state.header_recorded = true;
    }

    async fn write_str(&mut self, s: &str) -> io::Result<usize> {
        WriteOnly(self).write(s.as_bytes()).await
    }

    async fn read_from(&mut self, src: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<u64> {
        let mut buf = buffer_pool::acquire(self.state.copy_buffer_size);
        copy_buffer(src, &mut WriteOnly(self), &mut buf).await
    }

    /// Records an implicit 200 if nothing was recorded yet. The deferred
    /// status line is not sent; the response phase decides when it goes.
    async fn flush(&mut self) -> Result<(), WriterError> {
        if !self.state.header_recorded && !self.state.header_flushed {
            self.write_header(StatusCode::OK);
        }
        Ok(())
    }

    fn hijack(&mut self) -> Result<HijackedConnection, WriterError> {
        self.writer.hijack()
    }

    fn push(&mut self, target: &str, opts: &PushOptions) -> Result<(), WriterError> {
        self.writer.push(target, opts)
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> Result<(), WriterError> {
        self.writer.set_read_deadline(deadline)
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> Result<(), WriterError> {
        self.writer.set_write_deadline(deadline)
    }

    fn enable_full_duplex(&mut self) -> Result<(), WriterError> {
        Err(WriterError::NotSupported)
    }
}
