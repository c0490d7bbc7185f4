//! Transcode Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only *setting up* a transcoder can fail with an error. Once constructed,
//! every transcode reports its outcome as a [`Status`](crate::Status) code.

use derive_more::{Display, Error};

/// A transcode error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transcode operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configured program is neither an executable path nor on `PATH`.
    #[display("transcoder program `{_0}` not found")]
    ProgramNotFound(#[error(not(source))] String),
    /// The argument template can't produce a usable command line.
    #[display("invalid transcoder arguments: {_0}")]
    InvalidArguments(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
