//! Inbound request model and the request phase driver.
//!
//! [`process_request`] feeds connection, URI, header and body facts into the
//! session in phase order and stops at the first verdict.

use bytes::Bytes;
use http::header::{HeaderValue, IntoHeaderName, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, Method, Uri, Version};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use rampart_inspect::{headers, BoxBodyReader, Session, Verdict};

use crate::errors::InterceptError;

/// Buffered body stream.
pub type BoxBufBodyReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Request body stream.
///
/// A body that supports buffered reads keeps that capability through
/// inspection, so handlers can still use [`RequestBody::buf_read`] after the
/// inspected prefix was put back in front of it.
pub enum RequestBody {
    /// Plain byte stream
    Stream(BoxBodyReader),
    /// Stream that also supports `AsyncBufRead`
    Buffered(BoxBufBodyReader),
}

impl RequestBody {
    /// Buffered-read view, when the underlying stream has one.
    pub fn buf_read(&mut self) -> Option<&mut (dyn AsyncBufRead + Send + Unpin + 'static)> {
        match self {
            RequestBody::Stream(_) => None,
            RequestBody::Buffered(reader) => Some(&mut **reader),
        }
    }

    /// Whether [`RequestBody::buf_read`] is available.
    pub fn is_buffered(&self) -> bool {
        matches!(self, RequestBody::Buffered(_))
    }
}

impl From<BoxBodyReader> for RequestBody {
    fn from(reader: BoxBodyReader) -> Self {
        RequestBody::Stream(reader)
    }
}

impl AsyncRead for RequestBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RequestBody::Stream(reader) => Pin::new(reader).poll_read(cx, buf),
            RequestBody::Buffered(reader) => Pin::new(reader).poll_read(cx, buf),
        }
    }
}

/// An inbound HTTP request as seen by the middleware and downstream handlers.
///
/// Mirrors what most HTTP stacks hand to application code: the host and the
/// transfer codings are promoted out of the generic header view into their
/// own fields. Both keep the bytes the client sent.
pub struct Request {
    /// Peer address, `host:port` or bare host
    pub remote_addr: Option<String>,
    /// Request method
    pub method: Method,
    /// Request target
    pub uri: Uri,
    /// Protocol version
    pub version: Version,
    /// Header view, without `Host` and `Transfer-Encoding`
    pub headers: HeaderMap,
    /// Host the request was addressed to
    pub host: Option<Bytes>,
    /// Transfer codings, outermost last
    pub transfer_encoding: Vec<Bytes>,
    /// Request body stream
    pub body: Option<RequestBody>,
    /// Fires when the client goes away or the request deadline passes
    pub cancellation: Option<CancellationToken>,
}

impl Request {
    /// Create a request without headers or body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            remote_addr: None,
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            host: None,
            transfer_encoding: Vec::new(),
            body: None,
            cancellation: None,
        }
    }

    /// Build from `http` request parts.
    ///
    /// `Host` and `Transfer-Encoding` are moved out of the header map into
    /// [`Request::host`] and [`Request::transfer_encoding`]. The URI authority
    /// is used as host when no `Host` header is present (HTTP/2).
    pub fn from_parts(
        parts: http::request::Parts,
        body: Option<RequestBody>,
        remote_addr: Option<String>,
    ) -> Self {
        let mut headers = parts.headers;

        let host = match headers.remove(HOST) {
            Some(value) => Some(Bytes::copy_from_slice(value.as_bytes())),
            None => parts
                .uri
                .authority()
                .map(|a| Bytes::copy_from_slice(a.as_str().as_bytes())),
        };

        let transfer_encoding = match headers.entry(TRANSFER_ENCODING) {
            http::header::Entry::Occupied(entry) => entry
                .remove_entry_mult()
                .1
                .flat_map(|value| split_codings(value.as_bytes()))
                .collect(),
            http::header::Entry::Vacant(_) => Vec::new(),
        };

        Self {
            remote_addr,
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers,
            host,
            transfer_encoding,
            body,
            cancellation: None,
        }
    }

    /// Set the peer address.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Set the protocol version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set the host.
    pub fn with_host(mut self, host: impl Into<Bytes>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Append a header value.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Append a transfer coding.
    pub fn with_transfer_encoding(mut self, coding: impl Into<Bytes>) -> Self {
        self.transfer_encoding.push(coding.into());
        self
    }

    /// Set the body stream.
    pub fn with_body<R>(mut self, body: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.body = Some(RequestBody::Stream(Box::new(body)));
        self
    }

    /// Set a body stream that supports buffered reads.
    pub fn with_buffered_body<R>(mut self, body: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        self.body = Some(RequestBody::Buffered(Box::new(body)));
        self
    }

    /// Attach the request's cancellation signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Protocol string as the engine expects it (`HTTP/1.1`, `HTTP/2.0`, ...).
    pub fn protocol(&self) -> &'static str {
        protocol_str(self.version)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("remote_addr", &self.remote_addr)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("host", &self.host)
            .field("transfer_encoding", &self.transfer_encoding)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Split a `Transfer-Encoding` value into its codings, bytes untouched.
fn split_codings(value: &[u8]) -> Vec<Bytes> {
    value
        .split(|b| *b == b',')
        .map(|coding| coding.trim_ascii())
        .filter(|coding| !coding.is_empty())
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Engine spelling of an HTTP version.
pub fn protocol_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Split a peer address into host and port.
///
/// Accepts `host:port`, `[v6]:port`, bare hosts and bare IPv6 addresses. A
/// missing or unparsable port yields `None`.
pub fn split_remote_addr(addr: &str) -> (&str, Option<u16>) {
    if let Some((host, port)) = addr.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                return (inner, Some(port));
            }
            if !host.contains(':') {
                return (host, Some(port));
            }
        }
    }

    let bare = addr
        .strip_prefix('[')
        .and_then(|a| a.strip_suffix(']'))
        .unwrap_or(addr);
    (bare, None)
}

/// Body that replays the session's buffered prefix, then continues with the
/// bytes the session never read from the client's stream.
///
/// A buffered remainder yields a buffered body.
pub fn rewind_body(buffered: BoxBodyReader, remainder: RequestBody) -> RequestBody {
    match remainder {
        RequestBody::Stream(rest) => RequestBody::Stream(Box::new(buffered.chain(rest))),
        RequestBody::Buffered(rest) => {
            RequestBody::Buffered(Box::new(BufReader::new(buffered).chain(rest)))
        }
    }
}

/// Drive the request phases: connection, URI, headers, body.
///
/// Returns the first verdict raised. When the request body is inspected and
/// no verdict is raised, `req.body` is replaced with a stream that yields the
/// inspected prefix followed by whatever the session left unread.
pub async fn process_request(
    session: &mut dyn Session,
    req: &mut Request,
) -> Result<Option<Verdict>, InterceptError> {
    let (client, client_port) = split_remote_addr(req.remote_addr.as_deref().unwrap_or(""));

    // No socket access here, so the server side stays unknown.
    if let Some(verdict) = session.process_connection(client, client_port, "", None) {
        return Ok(Some(verdict));
    }

    let uri = req.uri.to_string();
    if let Some(verdict) = session.process_uri(&uri, req.method.as_str(), req.protocol()) {
        return Ok(Some(verdict));
    }

    for (name, value) in req.headers.iter() {
        session.add_request_header(name.as_str(), value.as_bytes());
    }

    if let Some(host) = req.host.as_deref().filter(|h| !h.is_empty()) {
        session.add_request_header(headers::HOST, host);
        session.set_server_name(host);
    }

    if let Some(coding) = req.transfer_encoding.first() {
        session.add_request_header(headers::TRANSFER_ENCODING, coding);
    }

    if let Some(verdict) = session.process_request_headers() {
        return Ok(Some(verdict));
    }

    if session.is_request_body_accessible() {
        if let Some(mut body) = req.body.take() {
            let progress = session
                .read_request_body_from(&mut body)
                .await
                .map_err(InterceptError::RequestBody)?;
            trace!(buffered = progress.handled, "Request body buffered");

            if let Some(verdict) = progress.verdict {
                return Ok(Some(verdict));
            }

            let buffered = session
                .request_body_reader()
                .map_err(InterceptError::RequestBodyReader)?;
            req.body = Some(rewind_body(buffered, body));
        }
    }

    let verdict = session
        .process_request_body()
        .map_err(InterceptError::RequestBodyPhase)?;
    if verdict.is_some() {
        debug!(uri = %uri, "Request body phase raised a verdict");
    }
    Ok(verdict)
}
