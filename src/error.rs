//! Unified error handling for track analysis.
//!
//! All fallible operations in this crate return [`Result`] with a
//! [`TrackAnalysisError`] describing which contract was violated.

use thiserror::Error;

/// Unified error type for track analysis operations.
#[derive(Debug, Error)]
pub enum TrackAnalysisError {
    /// Malformed input: bad coordinate ranges, mismatched channel-array
    /// lengths at track construction, invalid channel values.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Fewer points than required to compute a transition-based metric.
    #[error("Segment has {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        point_count: usize,
        minimum_required: usize,
    },

    /// A segment declares time-based metrics but a required timestamp is absent.
    #[error("Missing timestamp: {message}")]
    MissingTime { message: String },

    /// Invalid zone definition or invalid threshold parameters.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// An input file or geometry does not match any supported schema.
    #[error("Unsupported format: {message}")]
    UnsupportedFormat { message: String },

    /// GPX parsing failed at the file boundary.
    #[error("GPX error: {source}")]
    Gpx {
        #[from]
        source: gpx::errors::GpxError,
    },
}

impl TrackAnalysisError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn missing_time(message: impl Into<String>) -> Self {
        Self::MissingTime {
            message: message.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type alias for track analysis operations.
pub type Result<T> = std::result::Result<T, TrackAnalysisError>;
