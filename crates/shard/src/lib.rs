//! Sharded SQLite databases as one logical database.
//!
//! Some applications split a single logical database across many files:
//! `MSG0.db`, `MSG1.db`, `MSG2.db` and so on, each holding a horizontal slice
//! of the same tables. This crate finds those files and lets them be queried
//! as if they were one.
//!
//! # Architecture
//! - [`discover`] walks a directory tree for `<prefix>*.db` files and returns
//!   them as [`ShardFile`]s. Finding nothing is an error.
//! - [`ShardSet`] eagerly opens one read-only connection per file. Any failure
//!   fails the whole set: a silently skipped shard would mean silently
//!   incomplete results.
//! - [`QueryAggregator`] runs one parameterized query against every shard,
//!   combining the results by concatenation, first match, or summation.
//!
//! Rows come back as owned [`Row`]s of [`Value`]s, independent of the
//! connection that produced them.

mod aggregate;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod locate;
mod row;
mod set;

pub use crate::aggregate::QueryAggregator;
pub use crate::locate::{SHARD_EXTENSION, ShardFile, discover, discover_with_extension};
pub use crate::row::{FromValue, Row, Value};
pub use crate::set::ShardSet;
