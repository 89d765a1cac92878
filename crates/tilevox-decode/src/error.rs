//! Error types for decoding operations.

use std::fmt;

/// Errors that can occur while decoding mesh payloads or voxel buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input buffer is too small for the expected data.
    BufferTooSmall { expected: usize, actual: usize },
    /// Invalid data format or structure.
    InvalidFormat {
        context: &'static str,
        detail: String,
    },
    /// The payload requires a compression extension this crate cannot decode.
    UnsupportedCompression { extension: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { expected, actual } => {
                write!(
                    f,
                    "buffer too small: expected {expected} bytes, got {actual}"
                )
            }
            Self::InvalidFormat { context, detail } => {
                write!(f, "invalid format in {context}: {detail}")
            }
            Self::UnsupportedCompression { extension } => {
                write!(f, "unsupported mesh compression: {extension}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<gltf::Error> for DecodeError {
    fn from(e: gltf::Error) -> Self {
        Self::InvalidFormat {
            context: "gltf",
            detail: e.to_string(),
        }
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(e: image::ImageError) -> Self {
        Self::InvalidFormat {
            context: "image",
            detail: e.to_string(),
        }
    }
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
