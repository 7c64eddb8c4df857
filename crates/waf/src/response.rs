//! Response phase driver.
//!
//! Runs after the downstream handler returned. This is the last point where
//! the deferred status line can still change, so every path out of here
//! leaves the status flushed.

use http::StatusCode;
use tracing::trace;

use crate::buffer_pool;
use crate::errors::InterceptError;
use crate::interceptor::ResponseInterceptor;
use crate::writer::{copy_buffer, WriteOnly};

/// Evaluate the response body phase and deliver the outcome.
///
/// - standing verdict: nothing to do, the interceptor already flushed it
/// - body inspected, phase fails: 500 is flushed and the failure returned
/// - body inspected, verdict: the response is blanked with the verdict's status
/// - body inspected, no verdict: status flushed, buffered body streamed out
/// - body not inspected: status flushed if the handler never wrote a byte
pub async fn process_response(interceptor: &mut ResponseInterceptor<'_>) -> Result<(), InterceptError> {
    if interceptor.session.is_interrupted() {
        return Ok(());
    }

    if !(interceptor.session.is_response_body_accessible()
        && interceptor.session.is_response_body_processable())
    {
        interceptor.flush_header();
        return Ok(());
    }

    match interceptor.session.process_response_body() {
        Err(err) => {
            interceptor.override_status(StatusCode::INTERNAL_SERVER_ERROR);
            interceptor.flush_header();
            return Err(InterceptError::ResponseBodyPhase(err));
        }
        Ok(Some(verdict)) => {
            interceptor.blank_response(&verdict);
            return Ok(());
        }
        Ok(None) => {}
    }

    let mut reader = match interceptor.session.response_body_reader() {
        Ok(reader) => reader,
        Err(err) => {
            interceptor.override_status(StatusCode::INTERNAL_SERVER_ERROR);
            interceptor.flush_header();
            return Err(InterceptError::ResponseBodyReader(err));
        }
    };

    interceptor.flush_header();

    let mut buf = buffer_pool::acquire(interceptor.state.copy_buffer_size());
    let copied = copy_buffer(&mut reader, &mut WriteOnly(&mut *interceptor.writer), &mut buf)
        .await
        .map_err(InterceptError::CopyResponse)?;
    drop(buf);

    let stats = buffer_pool::pool_stats();
    trace!(
        bytes = copied,
        pooled_buffers = stats.pooled,
        reused_buffers = stats.reused,
        "Released response body delivered"
    );

    Ok(())
}
