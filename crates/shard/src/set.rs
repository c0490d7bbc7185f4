//! Shard connections and their lifecycle.

use crate::ShardFile;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::instrument;

/// An open connection to exactly one shard.
///
/// sqlx caches prepared statements per connection, so re-issuing the same
/// query against a handle reuses its statement instead of re-parsing it.
#[derive(Debug)]
pub(crate) struct ShardHandle {
    pub(crate) file: ShardFile,
    pub(crate) conn: SqliteConnection,
}

/// An ordered collection of open shard connections.
///
/// All shards are opened eagerly by [`open`](Self::open). Order is the order
/// of the files passed in, which matters for
/// [`select_one`](crate::QueryAggregator::select_one).
///
/// Call [`close`](Self::close) when finished. If a set is dropped without
/// being closed, sqlx still closes each connection when it is dropped, but
/// without waiting for SQLite to finish, so prefer closing explicitly.
#[derive(Debug)]
pub struct ShardSet {
    handles: Vec<ShardHandle>,
}
impl ShardSet {
    /// Connection options shared by every shard.
    ///
    /// Shards are opened read-only: nothing in this crate writes to them,
    /// and the databases usually belong to another application that may
    /// still be running.
    fn options(file: &ShardFile) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(file.path())
            .read_only(true)
            .create_if_missing(false)
            // The owning application may be holding a write lock.
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    /// Open a connection to every shard.
    ///
    /// If any shard fails to open, every connection opened so far is closed
    /// and the whole set fails with [`ErrorKind::ShardOpenFailed`].
    #[instrument(skip_all, fields(shards = files.len()))]
    pub async fn open(files: Vec<ShardFile>) -> Result<Self> {
        let mut set = Self { handles: Vec::with_capacity(files.len()) };
        for file in files {
            match Self::options(&file).connect().await {
                Ok(conn) => {
                    tracing::debug!(path = %file.path().display(), "Opened shard");
                    set.handles.push(ShardHandle { file, conn });
                },
                Err(err) => {
                    set.close().await;
                    return Err(err).or_raise(|| ErrorKind::ShardOpenFailed(file.path().to_path_buf()));
                },
            }
        }
        Ok(set)
    }

    /// Close every connection. Calling this more than once is a no-op.
    pub async fn close(&mut self) {
        for handle in self.handles.drain(..) {
            let path = handle.file.path().to_path_buf();
            if let Err(err) = handle.conn.close().await {
                // The connection is gone either way; nothing to recover.
                tracing::warn!(path = %path.display(), error = %err, "Error while closing shard");
            }
        }
    }

    /// Files backing this set, in set order.
    pub fn files(&self) -> impl Iterator<Item = &ShardFile> {
        self.handles.iter().map(|h| &h.file)
    }

    /// Number of open shards.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// A set is only empty after it has been closed.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn handles_mut(&mut self) -> &mut [ShardHandle] {
        &mut self.handles
    }
}
