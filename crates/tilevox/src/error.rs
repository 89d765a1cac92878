//! Error types for the tilevox crate.

use std::fmt;

/// Result type for tilevox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching, traversing or voxelizing tiles.
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed.
    Http {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// HTTP response had a non-success status code.
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// Mesh payload decoding failed.
    Decode(tilevox_decode::DecodeError),
    /// The query parameters are unusable.
    InvalidQuery {
        /// Description of what was invalid.
        detail: String,
    },
    /// A background task panicked or was cancelled.
    Task {
        /// The error message.
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http { url, message } => {
                write!(f, "http request to {url} failed: {message}")
            }
            Error::HttpStatus { url, status } => {
                write!(f, "http request to {url} returned status {status}")
            }
            Error::Decode(e) => write!(f, "decode error: {e}"),
            Error::InvalidQuery { detail } => write!(f, "invalid query: {detail}"),
            Error::Task { message } => write!(f, "background task failed: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tilevox_decode::DecodeError> for Error {
    fn from(e: tilevox_decode::DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Task {
            message: e.to_string(),
        }
    }
}
