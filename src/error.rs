//! Error handling and custom error types
//!
//! Provides unified error handling across the image lifecycle using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Content is not a supported image")]
    InvalidContent,

    #[error("Malformed identifier")]
    MalformedIdentifier,

    #[error("Image not found")]
    NotFound,

    #[error("Blob store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Metadata store unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("No free identifier after {0} attempts")]
    IdentifierExhausted(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),
}

impl Error {
    /// Whether the failure came from a backing store rather than the caller's input.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_) | Error::MetadataUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
