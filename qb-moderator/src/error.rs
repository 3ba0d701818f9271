//! Error types for qb-moderator
//!
//! Tracker failures are transient: they abort the triggering operation,
//! leave the record untouched and are retried naturally by the next
//! notification or scan. Parse failures are not errors at all; they become
//! `Invalid` verdicts.

use thiserror::Error;

/// Main error type for qb-moderator
#[derive(Debug, Error)]
pub enum Error {
    /// Tracker answered with a non-success status
    #[error("Tracker error {status}: {message}")]
    Tracker { status: u16, message: String },

    /// Request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// Tracker asked us to slow down (HTTP 429)
    #[error("Rate limited by tracker")]
    RateLimited,

    /// Event sync token expired; carries the replacement token
    #[error("Event sync token expired")]
    SyncExpired(String),

    /// Tracker response could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Requested record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Lock or scheduler bookkeeping is corrupted
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// qb-common error
    #[error("Common error: {0}")]
    Common(#[from] qb_common::Error),
}

impl Error {
    /// Whether the next notification or scan may succeed where this failed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Tracker { .. } | Error::Network(_) | Error::RateLimited | Error::SyncExpired(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Decode(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

/// Convenience Result type using qb-moderator Error
pub type Result<T> = std::result::Result<T, Error>;
