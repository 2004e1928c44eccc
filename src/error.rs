//! Error types for file stream stages.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for file stream operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The stage is misconfigured (empty path, unset descriptor, bad dtype).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Attempted to move the stream cursor past the end of the mapping.
    #[error("offset {offset} is out of range for a file of {filesize} bytes")]
    OffsetOutOfRange {
        /// Requested offset in bytes.
        offset: usize,
        /// Size of the mapped file in bytes.
        filesize: usize,
    },

    /// The read side was pointed at a path that does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Operation is not supported by this implementation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Operation is not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}

impl Error {
    /// Whether this error came from the underlying I/O and must end the run.
    ///
    /// Fatal errors are never retried by the stages in this crate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_) | Error::System(_))
    }

    /// Whether this error is a configuration problem detected before any cycle ran.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::OffsetOutOfRange { .. } | Error::FileNotFound(_)
        )
    }
}
