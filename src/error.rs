//! Error taxonomy for the setlist core
//!
//! Only malformed caller input and real persistence faults surface as errors.
//! Missing hardware, missing data and unknown devices are normal outcomes and
//! are reported through return values instead (see `device::SessionStatus`
//! and `controller::SendOutcome`).

use thiserror::Error;

/// A song rejected before it reaches persistence
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Title is empty or whitespace only
    #[error("song title is required")]
    MissingTitle,

    /// Id is empty or whitespace only
    #[error("song id must not be empty")]
    MissingId,
}

/// Errors returned by catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid song: {0}")]
    Validation(#[from] ValidationError),

    #[error("song '{0}' not found in catalog")]
    NotFound(String),

    #[error("failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Backend read/write failure (sled, filesystem)
    #[error("catalog persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl CatalogError {
    /// True when the caller supplied bad input (as opposed to an I/O fault)
    pub fn is_rejection(&self) -> bool {
        matches!(self, CatalogError::Validation(_) | CatalogError::NotFound(_))
    }
}

/// Faults inside the device layer
///
/// These never escape `DeviceSession`; they are logged and folded into the
/// `Denied` / unbound outcomes.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("MIDI backend unavailable: {0}")]
    Backend(String),

    #[error("output '{0}' is not available")]
    UnknownOutput(String),

    #[error("failed to open output '{id}': {reason}")]
    Open { id: String, reason: String },
}
