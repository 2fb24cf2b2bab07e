//! Capture error types and handling
//!
//! This module defines all error types used throughout the capture core,
//! providing clear error messages and context for debugging and error handling.

use thiserror::Error;

/// Main error type for capture operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Operation attempted out of the required lifecycle order
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },

    /// Requested pixel format has no platform mapping
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format description
        format: String,
    },

    /// No device matched the requested identifier
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// The platform negotiation chain failed during start
    #[error("Negotiation failed: {reason}")]
    NegotiationFailed {
        /// Failure reason
        reason: String,
    },

    /// Frame buffer length contradicts the declared format
    #[error("Malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame {
        /// Expected buffer size
        expected: usize,
        /// Actual buffer size
        actual: usize,
    },

    /// Unexpected lower-level platform failure
    #[error("Platform failure ({code}): {message}")]
    Platform {
        /// Platform error code
        code: i32,
        /// Error message
        message: String,
    },

    /// Bounded wait expired
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// Duration after which the timeout occurred
        duration: std::time::Duration,
    },
}

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

impl CaptureError {
    /// Check if the error leaves the session usable
    ///
    /// A malformed frame or a failed negotiation does not poison the
    /// session; the next start or the next sample proceeds normally.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CaptureError::MalformedFrame { .. } => true,
            CaptureError::NegotiationFailed { .. } => true,
            CaptureError::Timeout { .. } => true,
            CaptureError::InvalidState { .. } => true,
            CaptureError::UnsupportedFormat { .. } => false,
            CaptureError::DeviceNotFound { .. } => false,
            CaptureError::Platform { .. } => false,
        }
    }
}
