//! Error types for calsched operations.

use thiserror::Error;

/// Errors that can occur while scheduling.
#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// An attendee (or the organizer) could not be mapped to a reachable scheduling address.
    #[error("Cannot resolve scheduling address '{address}': {reason}")]
    AddressResolution { address: String, reason: String },

    /// Network, authorization or server failure. Retrying is left to the caller.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A conditional write lost against a concurrent writer.
    #[error("Conflict writing {href}: revision {revision} is no longer current")]
    Conflict { href: String, revision: String },

    /// Bounded conflict retries were exhausted.
    #[error(
        "Could not reconcile {uid} for {attendee} after {attempts} attempts (last revision: {})",
        last_revision.as_deref().unwrap_or("none")
    )]
    ReconciliationFailed {
        uid: String,
        attendee: String,
        last_revision: Option<String>,
        attempts: u32,
    },

    #[error("{attendee} is not an attendee of {uid}")]
    AttendeeNotFound { uid: String, attendee: String },

    #[error("Invalid participation transition: {0}")]
    InvalidTransition(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Expected a {expected} message, got {actual}")]
    UnexpectedMessage { expected: String, actual: String },

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("ICS generation error: {0}")]
    IcsGenerate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedError {
    /// Only lost conditional writes are retried internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedError::Conflict { .. })
    }
}

/// Result type alias for calsched operations.
pub type SchedResult<T> = Result<T, SchedError>;
