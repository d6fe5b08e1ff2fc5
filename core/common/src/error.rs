//! Common error types for bwkit.

use thiserror::Error;

/// Top-level error type for vault client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The vault executable exited non-zero, the sidecar answered with a
    /// failure envelope, or the endpoint could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Output could not be parsed as the expected structured data.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Requested object is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Login or unlock was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Executable missing or invalid server URL.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input provided by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error stems from a malformed call rather than from the
    /// vault or the transport.
    ///
    /// Only these errors cross the object client boundary; everything else is
    /// logged and surfaced as "no result".
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
