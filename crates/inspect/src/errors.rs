//! Inspection engine error types.

use thiserror::Error;

/// Result type for session operations.
pub type InspectResult<T> = Result<T, InspectError>;

/// Failures reported by the inspection engine.
///
/// None of these is a blocking decision. A blocking decision is always a
/// [`Verdict`](crate::Verdict) value.
#[derive(Debug, Error)]
pub enum InspectError {
    /// Reading from or writing to a body stream failed
    #[error("body I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine could not buffer body content (temporary storage, limits)
    #[error("body buffer error: {0}")]
    BodyBuffer(String),

    /// Rule evaluation failed inside the engine
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Releasing engine-side resources failed
    #[error("failed to release session resources: {0}")]
    Release(String),
}
