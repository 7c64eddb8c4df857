//! In-memory response writer.
//!
//! [`ResponseRecorder`] is the writer to hand the middleware when the server
//! integration wants an `http::Response` back instead of a streaming sink. It
//! also keeps enough bookkeeping (header writes, the header snapshot taken when
//! the status line was sent) to assert on exactly what a client would see.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use std::io;
use std::time::Instant;

use crate::errors::WriterError;
use crate::writer::{BodyWriter, ResponseWriter};

/// Records a response in memory.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    status: Option<StatusCode>,
    sent_headers: Option<HeaderMap>,
    header_writes: usize,
    body: BytesMut,
    flushes: usize,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl ResponseRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Status line sent, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Headers as they were when the status line was sent.
    pub fn sent_headers(&self) -> Option<&HeaderMap> {
        self.sent_headers.as_ref()
    }

    /// Number of `write_header` calls received, including ignored ones.
    pub fn header_writes(&self) -> usize {
        self.header_writes
    }

    /// Body bytes written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of `flush` calls received.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Last read deadline set.
    pub fn read_deadline(&self) -> Option<Instant> {
        self.read_deadline
    }

    /// Last write deadline set.
    pub fn write_deadline(&self) -> Option<Instant> {
        self.write_deadline
    }

    /// Convert into an `http::Response`.
    ///
    /// Uses the header snapshot taken when the status line was sent, or the
    /// staged headers with a 200 status if nothing was ever written.
    pub fn into_response(self) -> Response<Bytes> {
        let status = self.status.unwrap_or(StatusCode::OK);
        let headers = self.sent_headers.unwrap_or(self.headers);

        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

#[async_trait]
impl BodyWriter for ResponseRecorder {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

#[async_trait]
impl ResponseWriter for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        self.header_writes += 1;
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);
        self.sent_headers = Some(self.headers.clone());
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        self.flushes += 1;
        Ok(())
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> Result<(), WriterError> {
        self.read_deadline = deadline;
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> Result<(), WriterError> {
        self.write_deadline = deadline;
        Ok(())
    }
}
