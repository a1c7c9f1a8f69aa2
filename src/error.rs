//! Typed errors for the acquisition side and per-frame input validation.

use thiserror::Error;

/// A landmark observation that cannot be used this tick.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("expected {expected} landmarks, got {got}")]
    WrongCount { expected: usize, got: usize },

    #[error("landmark {index} has a non-finite coordinate")]
    NonFinite { index: usize },

    #[error("derived hand features are not finite")]
    DegenerateFeatures,

    #[error("malformed landmark line: {0}")]
    Malformed(String),
}

/// Failures of the external landmark backend.
///
/// None of these stop the tick loop: the acquisition thread reports them as
/// status and retries `open` after a backoff.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("landmark source '{source_name}' unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("landmark source i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("landmark source closed")]
    Closed,
}
