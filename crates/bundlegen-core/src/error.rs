//! Error types for bundle generation and lifecycle operations.

use std::time::Duration;

/// Bundle errors.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// No archive exists for the requested bundle id.
    #[error("bundle not found: {bundle_id}")]
    NotFound { bundle_id: String },

    /// Bundle id contains characters that are not allowed in a file name.
    #[error("invalid bundle id: {bundle_id:?}")]
    InvalidBundleId { bundle_id: String },

    /// Writing fixtures or packing the archive failed.
    #[error("bundle generation failed: {message}")]
    GenerationFailure { message: String },

    /// Generation did not finish within the configured bound.
    #[error("bundle generation timed out after {timeout:?}")]
    GenerationTimeout { timeout: Duration },

    /// Generation was abandoned before the archive was published.
    #[error("bundle generation cancelled")]
    Cancelled,

    /// No publisher was initialized for the notification sink.
    #[error("transport unavailable: {message}")]
    TransportUnavailable { message: String },

    /// The publisher rejected the notification or timed out.
    #[error("publish failed: {message}")]
    PublishFailed { message: String },

    /// Filesystem error outside of generation (registry scan, read, marker).
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl BundleError {
    pub(crate) fn generation(context: &str, err: impl std::fmt::Display) -> Self {
        Self::GenerationFailure {
            message: format!("{}: {}", context, err),
        }
    }

    pub(crate) fn io(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            message: format!("{}: {}", context, err),
        }
    }

    /// Returns true if the requested bundle does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if generation stopped on a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the error originates in the notification transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportUnavailable { .. } | Self::PublishFailed { .. }
        )
    }

    /// HTTP status code to surface for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::InvalidBundleId { .. } => 400,
            Self::TransportUnavailable { .. } | Self::PublishFailed { .. } => 500,
            Self::GenerationFailure { .. }
            | Self::GenerationTimeout { .. }
            | Self::Cancelled => 500,
            Self::Io { .. } => 500,
        }
    }
}

/// Result type for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;
