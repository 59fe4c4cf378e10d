use thiserror::Error;

use crate::models::AnatomicalPart;

/// Failures surfaced to the clinical flow. Each one blocks progression until corrected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no points recorded for {part}; test at least one point")]
    EmptyResult { part: AnatomicalPart },

    #[error("session has no finalized limb")]
    IncompleteSession,

    #[error("point {index} is outside the layout of {part}")]
    PointOutOfRange { part: AnatomicalPart, index: usize },

    #[error("level {0} is not a confirmed monofilament level")]
    InvalidLevel(u8),

    #[error("no limb is under test")]
    NoActiveLimb,

    #[error("a save is already in flight")]
    SaveInFlight,

    #[error("persistence failed: {0}")]
    Persistence(String),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Wraps a store failure, keeping the collaborator's reason verbatim.
    pub fn persistence(err: anyhow::Error) -> Self {
        SessionError::Persistence(format!("{err:#}"))
    }
}
