//! Common error types for Quoteboard

use thiserror::Error;

/// Common result type for Quoteboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by Quoteboard crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encoding or decoding of persisted quote data
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal bookkeeping was found in a state that should be impossible
    #[error("Invariant violated: {0}")]
    Invariant(String),
}
