//! Shard Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The underlying `sqlx` or I/O error is
//! always attached as a child frame, so the kinds below only need to say
//! *which* shard (or which part of the discovery walk) failed.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A shard error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for shard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Discovery finished without a single file matching the prefix.
    #[display("no shards named `{_0}*` found under {}", _1.display())]
    NoShardsFound(#[error(not(source))] String, PathBuf),
    /// A directory could not be read while walking the discovery root.
    #[display("could not read directory during shard discovery: {}", _0.display())]
    Discovery(#[error(not(source))] PathBuf),
    /// A shard could not be opened. The whole set is unusable.
    #[display("failed to open shard: {}", _0.display())]
    ShardOpenFailed(#[error(not(source))] PathBuf),
    /// A query failed against one shard, aborting the aggregate call.
    #[display("query failed against shard: {}", _0.display())]
    QueryFailed(#[error(not(source))] PathBuf),
    /// A column was missing or held a value of an unexpected type.
    #[display("invalid value for column `{_0}`")]
    InvalidData(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
