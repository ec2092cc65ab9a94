//! Error types for spillway.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.

use thiserror::Error;

/// Validation errors raised synchronously when a submission is malformed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("buffer reference has a null address")]
    NullBuffer,

    #[error("invalid destination handle: {handle}")]
    InvalidDestination { handle: i32 },
}

/// Runtime errors raised by the engine and its event streams.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("engine is stopped")]
    Stopped,

    #[error("channel disconnected: {path}")]
    Disconnected { path: String },

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

/// Top-level error type for spillway.
///
/// This enum encompasses all possible errors returned by the public surface.
#[derive(Debug, Error)]
pub enum SpillError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl SpillError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a runtime error.
    #[must_use]
    pub const fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }

    /// Returns true if the engine rejected the call because it was stopped.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Runtime(RuntimeError::Stopped))
    }
}

/// Result type alias for spillway operations.
pub type SpillResult<T> = Result<T, SpillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_null_buffer() {
        let err = ValidationError::NullBuffer;
        let msg = format!("{err}");
        assert!(msg.contains("null address"));
    }

    #[test]
    fn test_validation_error_invalid_destination() {
        let err = ValidationError::InvalidDestination { handle: -3 };
        let msg = format!("{err}");
        assert!(msg.contains("-3"));
    }

    #[test]
    fn test_runtime_error_timeout() {
        let err = RuntimeError::Timeout { duration_ms: 250 };
        let msg = format!("{err}");
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn test_spill_error_from_validation() {
        let err: SpillError = ValidationError::NullBuffer.into();
        assert!(err.is_validation());
        assert!(!err.is_runtime());
        assert!(!err.is_stopped());
    }

    #[test]
    fn test_spill_error_from_runtime() {
        let err: SpillError = RuntimeError::Stopped.into();
        assert!(err.is_runtime());
        assert!(err.is_stopped());
    }

    #[test]
    fn test_spill_error_disconnected_display() {
        let err: SpillError = RuntimeError::Disconnected {
            path: "events".to_string(),
        }
        .into();
        let msg = format!("{err}");
        assert!(msg.contains("events"));
    }
}
