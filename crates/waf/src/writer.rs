//! Response writer abstraction.
//!
//! Downstream handlers produce their response through a [`ResponseWriter`]:
//! they stage headers, record a status line, then stream body bytes. The
//! middleware substitutes its interceptor for the real writer, so handlers
//! cannot tell when (or whether) the status line actually leaves.
//!
//! Optional capabilities (hijack, push, deadlines, full duplex) default to
//! [`WriterError::NotSupported`].

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use std::io;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::buffer_pool;
use crate::errors::WriterError;

/// Raw connection handed out by [`ResponseWriter::hijack`].
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// A hijacked connection.
pub type HijackedConnection = Box<dyn Connection>;

/// Options for an HTTP/2 server push.
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Method of the promised request, GET or HEAD
    pub method: Method,
    /// Headers of the promised request
    pub headers: HeaderMap,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
        }
    }
}

/// Write-only body sink.
///
/// Generic copy routines take this instead of a full [`ResponseWriter`] so
/// they can never reach a writer's own bulk-copy path.
#[async_trait]
pub trait BodyWriter: Send {
    /// Write body bytes, returning how many were accepted.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Response writer as seen by downstream handlers.
#[async_trait]
pub trait ResponseWriter: BodyWriter {
    /// Headers staged for the response.
    fn headers(&self) -> &HeaderMap;

    /// Mutable access to the staged headers.
    ///
    /// Mutations after the status line was sent have no effect on the wire.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Record the status line. Only the first call counts.
    fn write_header(&mut self, status: StatusCode);

    /// Write a string body chunk.
    async fn write_str(&mut self, s: &str) -> io::Result<usize> {
        self.write(s.as_bytes()).await
    }

    /// Copy `src` into the body until EOF.
    async fn read_from(&mut self, src: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<u64> {
        let mut buf = buffer_pool::acquire_default();
        copy_buffer(src, &mut WriteOnly(self), &mut buf).await
    }

    /// Flush buffered data to the client.
    async fn flush(&mut self) -> Result<(), WriterError> {
        Ok(())
    }

    /// Take over the underlying connection.
    fn hijack(&mut self) -> Result<HijackedConnection, WriterError> {
        Err(WriterError::NotSupported)
    }

    /// Initiate an HTTP/2 server push.
    fn push(&mut self, _target: &str, _opts: &PushOptions) -> Result<(), WriterError> {
        Err(WriterError::NotSupported)
    }

    /// Deadline for reading the request, including the body. `None` clears it.
    fn set_read_deadline(&mut self, _deadline: Option<Instant>) -> Result<(), WriterError> {
        Err(WriterError::NotSupported)
    }

    /// Deadline for writing the response. `None` clears it.
    fn set_write_deadline(&mut self, _deadline: Option<Instant>) -> Result<(), WriterError> {
        Err(WriterError::NotSupported)
    }

    /// Allow reading the request body while the response is being written.
    fn enable_full_duplex(&mut self) -> Result<(), WriterError> {
        Err(WriterError::NotSupported)
    }
}

/// Exposes only the [`BodyWriter`] side of a writer.
pub struct WriteOnly<'a, W: ?Sized>(pub &'a mut W);

#[async_trait]
impl<W: BodyWriter + ?Sized> BodyWriter for WriteOnly<'_, W> {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf).await
    }
}

/// Copy `src` into `dst` through `buf` until EOF.
///
/// A write that accepts fewer bytes than offered ends the copy with
/// [`io::ErrorKind::WriteZero`], so a sink that stopped accepting data does
/// not make us drain the whole source.
pub async fn copy_buffer<R, W>(src: &mut R, dst: &mut W, buf: &mut [u8]) -> io::Result<u64>
where
    R: AsyncRead + Unpin + Send + ?Sized,
    W: BodyWriter + ?Sized,
{
    let mut total = 0u64;
    loop {
        let nr = src.read(buf).await?;
        if nr == 0 {
            return Ok(total);
        }

        let nw = dst.write(&buf[..nr]).await?;
        total += nw as u64;
        if nw < nr {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short write"));
        }
    }
}
