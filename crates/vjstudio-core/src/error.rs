//! Error types for VJ Studio.

use thiserror::Error;
use uuid::Uuid;

/// Reasons an edit is refused by the layout rules.
///
/// These are not fatal: the proposing interaction is discarded and the
/// track list stays as it was.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutViolation {
    #[error("clip {clip} overlaps clip {other} on track {track}")]
    Overlap { track: Uuid, clip: Uuid, other: Uuid },

    #[error("track {track} does not accept {clip_kind} clips")]
    KindMismatch { track: Uuid, clip_kind: String },

    #[error("clip {clip} starts before zero ({start})")]
    NegativeStart { clip: Uuid, start: f64 },

    #[error("clip {clip} has non-positive duration ({duration})")]
    NonPositiveDuration { clip: Uuid, duration: f64 },

    #[error("track {0} is locked")]
    TrackLocked(Uuid),

    #[error("time {time} is outside clip {clip}")]
    OutOfBounds { clip: Uuid, time: f64 },
}

/// Main error type for VJ Studio operations.
#[derive(Error, Debug)]
pub enum VjError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Layout violation: {0}")]
    Layout(#[from] LayoutViolation),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VjError {
    /// Whether this error is a layout rejection rather than a real failure.
    pub fn is_layout_violation(&self) -> bool {
        matches!(self, Self::Layout(_))
    }
}

/// Result type alias for VJ Studio operations.
pub type Result<T> = std::result::Result<T, VjError>;
