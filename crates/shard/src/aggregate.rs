//! Fan a single query out across every shard in a [`ShardSet`].
//!
//! There is deliberately no "smart" merging here: each retrieval mode has one
//! fixed composition rule, and it's up to the caller to pick the mode that
//! matches what the query means.
//!
//! | Mode                                        | Composition                          |
//! |---------------------------------------------|--------------------------------------|
//! | [`select_all`](QueryAggregator::select_all) | concatenate, in shard order          |
//! | [`select_one`](QueryAggregator::select_one) | first shard with a row wins          |
//! | [`select_count`](QueryAggregator::select_count) | sum the single scalar of every shard |

use crate::error::{ErrorKind, Result};
use crate::row::{Row, Value, arguments};
use crate::set::ShardHandle;
use crate::{ShardSet, discover};
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt, TryStreamExt};
use sqlx::Executor;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::instrument;

const LIST_TABLES: &str = "SELECT name FROM sqlite_master WHERE type = 'table';";

/// One logical database made of many physical shards.
///
/// Every call is all-or-nothing: if the query fails against any shard the
/// whole call fails with [`ErrorKind::QueryFailed`] naming that shard, and
/// whatever was collected from earlier shards is thrown away.
///
/// Parameters are always bound, never interpolated into the query text, so
/// the same `(query, params)` pair is safe to replay against every shard.
///
/// # Examples
///
/// ```no_run
/// use voxport_shard::{QueryAggregator, Value};
/// use futures::TryStreamExt;
///
/// # async fn example() -> voxport_shard::error::Result<()> {
/// let mut messages = QueryAggregator::discover("/path/to/Msg", "MSG").await?;
/// let params = [Value::from(34)];
/// let total = messages.select_count("SELECT count(*) FROM MSG WHERE Type = ?;", &params).await?;
/// println!("{total} voice messages");
/// {
///     let mut rows = std::pin::pin!(messages.select_all("SELECT MsgSvrID FROM MSG WHERE Type = ?;", &params));
///     while let Some(row) = rows.try_next().await? {
///         println!("{}", row.get::<i64>("MsgSvrID")?);
///     }
/// }
/// messages.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QueryAggregator {
    shards: ShardSet,
}
impl From<ShardSet> for QueryAggregator {
    fn from(shards: ShardSet) -> Self {
        Self { shards }
    }
}
impl QueryAggregator {
    /// Discover every `<prefix>*.db` below `root` and open them all.
    pub async fn discover(root: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let files = discover(root, prefix).await?;
        Ok(ShardSet::open(files).await?.into())
    }

    /// The underlying shards, in query order.
    pub fn shards(&self) -> &ShardSet {
        &self.shards
    }

    /// Close every underlying shard connection. Idempotent.
    pub async fn close(&mut self) {
        self.shards.close().await;
    }

    fn failed(handle: &ShardHandle) -> ErrorKind {
        ErrorKind::QueryFailed(handle.file.path().to_path_buf())
    }

    /// Stream every row from every shard, shard after shard.
    ///
    /// The statement is prepared on every shard before the first row is
    /// yielded, so syntax errors and missing tables on *any* shard surface as
    /// the first (and only) item of the stream. A fault discovered later,
    /// mid-stream, ends the stream with a single error item; rows already
    /// received from that call must then be discarded by the caller.
    ///
    /// Rows are fetched incrementally and the stream can only be consumed
    /// once. To start over, call this again.
    pub fn select_all<'a>(
        &'a mut self,
        query: &'a str,
        params: &'a [Value],
    ) -> impl Stream<Item = Result<Row>> + Send + 'a {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            for handle in self.shards.handles_mut().iter_mut() {
                if let Err(err) = handle.conn.prepare(query).await.or_raise(|| Self::failed(handle)) {
                    yield Err(err);
                    return;
                }
            }
            for handle in self.shards.handles_mut().iter_mut() {
                let args = match arguments(params).map_err(sqlx::Error::Encode).or_raise(|| Self::failed(handle)) {
                    Ok(args) => args,
                    Err(err) => {
                        yield Err(err);
                        return;
                    },
                };
                let path = handle.file.path();
                let mut yielded: u64 = 0;
                let mut rows = sqlx::query_with(query, args).fetch(&mut handle.conn);
                while let Some(row) = rows.next().await {
                    let row = row.and_then(|r| Row::try_from(&r));
                    match row.or_raise(|| ErrorKind::QueryFailed(path.to_path_buf())) {
                        Ok(row) => {
                            yielded += 1;
                            yield Ok(row);
                        },
                        Err(err) => {
                            yield Err(err);
                            return;
                        },
                    }
                }
                tracing::trace!(path = %path.display(), rows = yielded, "Shard exhausted");
            }
        })
    }

    /// Return the first row found, trying shards in order.
    ///
    /// Shards after the first match are never queried. If the same logical
    /// row exists in more than one shard, the earliest shard in the set wins;
    /// this is the tie-break policy, not an error. Returns `Ok(None)` when no
    /// shard has a matching row.
    #[instrument(skip(self, params))]
    pub async fn select_one(&mut self, query: &str, params: &[Value]) -> Result<Option<Row>> {
        for handle in self.shards.handles_mut().iter_mut() {
            let args = arguments(params).map_err(sqlx::Error::Encode).or_raise(|| Self::failed(handle))?;
            let row = sqlx::query_with(query, args)
                .fetch_optional(&mut handle.conn)
                .await
                .or_raise(|| Self::failed(handle))?;
            if let Some(row) = row {
                tracing::trace!(path = %handle.file.path().display(), "Match found");
                return Ok(Some(Row::try_from(&row).or_raise(|| Self::failed(handle))?));
            }
        }
        Ok(None)
    }

    /// Run a scalar query (one row, one numeric column, e.g. `count(*)`)
    /// against every shard and sum the results.
    ///
    /// A `NULL` scalar (e.g. `SUM()` over no rows) counts as zero. A shard
    /// that returns no row at all, a non-integer scalar, or a scalar that
    /// overflows the running total fails the call.
    #[instrument(skip(self, params))]
    pub async fn select_count(&mut self, query: &str, params: &[Value]) -> Result<i64> {
        let mut total: i64 = 0;
        for handle in self.shards.handles_mut().iter_mut() {
            let args = arguments(params).map_err(sqlx::Error::Encode).or_raise(|| Self::failed(handle))?;
            let row = sqlx::query_with(query, args)
                .fetch_one(&mut handle.conn)
                .await
                .and_then(|r| Row::try_from(&r))
                .or_raise(|| Self::failed(handle))?;
            let count = match row.first() {
                Some(Value::Integer(n)) => *n,
                Some(Value::Null) => 0,
                _ => {
                    let column = row.columns().first().cloned().unwrap_or_default();
                    return Err(exn::Exn::from(ErrorKind::InvalidData(column))).or_raise(|| Self::failed(handle));
                },
            };
            tracing::trace!(path = %handle.file.path().display(), count, "Shard counted");
            let Some(sum) = total.checked_add(count) else {
                let column = row.columns().first().cloned().unwrap_or_default();
                return Err(exn::Exn::from(ErrorKind::InvalidData(column))).or_raise(|| Self::failed(handle));
            };
            total = sum;
        }
        Ok(total)
    }

    /// Names of every table found in any shard. Duplicates collapse.
    pub async fn list_tables(&mut self) -> Result<BTreeSet<String>> {
        self.select_all(LIST_TABLES, &[])
            .and_then(|row| async move { row.get::<String>("name") })
            .try_collect()
            .await
    }

    /// Total number of rows in `table` across every shard.
    pub async fn table_row_count(&mut self, table: &str) -> Result<i64> {
        // Identifiers can't be bound as parameters; quote instead.
        let query = format!("SELECT count(*) FROM \"{}\";", table.replace('"', "\"\""));
        self.select_count(&query, &[]).await
    }
}
