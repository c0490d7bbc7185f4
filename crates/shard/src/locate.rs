//! Shard discovery.
//!
//! Walks a directory tree looking for database files whose name starts with a
//! given prefix, e.g. `MSG0.db`, `MSG1.db` and `Multi/MSG2.db` for the prefix
//! `MSG`.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// File extension of a shard, without the leading dot.
pub const SHARD_EXTENSION: &str = "db";

/// One discovered database file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardFile {
    path: PathBuf,
    root: PathBuf,
}
impl ShardFile {
    /// Absolute path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory the discovery walk started from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Used by callers (and tests) that already know exactly which files they
    /// want, bypassing discovery.
    pub fn new(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), root: root.into() }
    }
}

fn is_shard(name: &OsStr, prefix: &str, extension: &str) -> bool {
    // Non-UTF-8 file names can't match a UTF-8 prefix anyway.
    let Some(name) = name.to_str() else {
        return false;
    };
    let Some(stem) = name.strip_suffix(extension).and_then(|s| s.strip_suffix('.')) else {
        return false;
    };
    stem.starts_with(prefix)
}

/// Recursively find every `<prefix>*.db` file below `root`.
///
/// Files are returned sorted by path so that repeated discoveries over the
/// same directory produce the same shard order (and therefore the same
/// first-match results from [`QueryAggregator::select_one`](crate::QueryAggregator::select_one)).
///
/// Fails with [`ErrorKind::NoShardsFound`] when nothing matches, including
/// when `root` does not exist.
pub async fn discover(root: impl AsRef<Path>, prefix: &str) -> Result<Vec<ShardFile>> {
    discover_with_extension(root, prefix, SHARD_EXTENSION).await
}

/// Like [`discover`], for shards that don't use the `.db` extension.
/// `extension` is given without the leading dot.
#[instrument(skip(root), fields(root = %root.as_ref().display()))]
pub async fn discover_with_extension(root: impl AsRef<Path>, prefix: &str, extension: &str) -> Result<Vec<ShardFile>> {
    let root = std::path::absolute(root.as_ref()).or_raise(|| ErrorKind::Discovery(root.as_ref().to_path_buf()))?;
    let mut found = Vec::new();
    let mut stack = vec![root.clone()];

    while let Some(current) = stack.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            // A root that doesn't exist simply contains no shards.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err).or_raise(|| ErrorKind::Discovery(current)),
        };
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Discovery(current.clone()))? {
            let file_type = entry.file_type().await.or_raise(|| ErrorKind::Discovery(entry.path()))?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if is_shard(&entry.file_name(), prefix, extension) {
                // Symlinks are followed here but not when descending, so a
                // linked database counts while a linked directory loop can't.
                tracing::trace!(path = %entry.path().display(), "Discovered shard");
                found.push(ShardFile { path: entry.path(), root: root.clone() });
            }
        }
    }

    if found.is_empty() {
        exn::bail!(ErrorKind::NoShardsFound(prefix.to_string(), root));
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::info!(count = found.len(), prefix, "Shard discovery complete");
    Ok(found)
}
