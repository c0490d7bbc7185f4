//! Export Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The kinds here are the *fatal*
//! failures of a run; per-message problems (missing media, a failed
//! transcode) are reported as events instead and never become errors.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An export error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a fatal export failure.
///
/// ### Setup Errors
/// - [`ErrorKind::NoShards`]
/// - [`ErrorKind::Shards`]
/// - [`ErrorKind::AccountNotFound`]
/// - [`ErrorKind::InvalidAccount`]
/// - [`ErrorKind::Destination`]
///
/// ### Run Errors
/// - [`ErrorKind::Query`]
/// - [`ErrorKind::InvalidCandidate`]
/// - [`ErrorKind::Worker`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No database file matched the prefix.
    #[display("no `{_0}*` databases found")]
    NoShards(#[error(not(source))] String),
    /// Databases were found, but at least one could not be opened.
    #[display("could not open the `{_0}*` databases")]
    Shards(#[error(not(source))] String),
    /// The account is unknown to the contacts databases.
    #[display("account `{_0}` not found")]
    AccountNotFound(#[error(not(source))] String),
    /// The account can't be used as an output directory name.
    #[display("account `{_0}` is not a valid directory name")]
    InvalidAccount(#[error(not(source))] String),
    /// A query failed; the payload says what the query was for.
    #[display("query failed while {_0}")]
    Query(#[error(not(source))] &'static str),
    /// A candidate row had no usable message identifier.
    #[display("message row has no usable identifier")]
    InvalidCandidate,
    /// The destination directory could not be created or inspected.
    #[display("destination not usable: {}", _0.display())]
    Destination(#[error(not(source))] PathBuf),
    /// The background worker could not be started, or died.
    #[display("export worker failed")]
    Worker,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
