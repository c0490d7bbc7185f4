//! Helpers for building real shard files in tests.
//!
//! Only compiled for this crate's own tests or with the `fixtures` feature,
//! which other crates enable in their dev dependencies.

use crate::ShardFile;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::PathBuf;

/// Create (or extend) a SQLite database at `path` by running `statements` in
/// order, then close it and return it as a [`ShardFile`] rooted at its parent
/// directory.
///
/// Panics on any failure. The panic here is DELIBERATE: if test setup is
/// wrong, then the test should not pass.
pub async fn create_shard(path: impl Into<PathBuf>, statements: &[&str]) -> ShardFile {
    let path = path.into();
    let mut conn = match SqliteConnectOptions::new().filename(&path).create_if_missing(true).connect().await {
        Ok(conn) => conn,
        Err(err) => panic!("create_shard: cannot create {}: {err}", path.display()),
    };
    for statement in statements {
        if let Err(err) = sqlx::query(statement).execute(&mut conn).await {
            panic!("create_shard: `{statement}` failed on {}: {err}", path.display());
        }
    }
    if let Err(err) = conn.close().await {
        panic!("create_shard: cannot close {}: {err}", path.display());
    }
    let root = path.parent().map(PathBuf::from).unwrap_or_default();
    ShardFile::new(path, root)
}
