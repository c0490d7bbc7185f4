//! The export run as a stream of events.
//!
//! The databases are opened once at the start and closed on every way out:
//! before "no candidates" and before a fatal error are yielded, and after
//! the summary and the reveal. Dropping the stream part way through closes
//! them on drop.

mod account;
mod message;

use crate::error::{ErrorKind, Result};
use crate::event::ExportEvent;
use crate::pipeline::message::{Outcome, export_message};
use crate::{Context, ExportRequest, VOICE_MESSAGE_TYPE};
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use std::path::Path;
use std::pin::pin;
use voxport_shard::error::ErrorKind as ShardErrorKind;
use voxport_shard::{QueryAggregator, Row, ShardSet, Value, discover_with_extension};

const COUNT_CANDIDATES: &str = include_str!("../../queries/count_candidates.sql");
const LIST_CANDIDATES: &str = include_str!("../../queries/list_candidates.sql");

/// Streams [`ExportEvent`]s while exporting every incoming voice message of
/// `request.account`.
///
/// The stream yields events in the order documented on [`ExportEvent`].
/// Messages without media and messages the transcoder rejects are reported
/// and skipped; anything else that goes wrong (missing or unreadable shards,
/// an unknown account, a failing query, an unusable destination) is yielded
/// as a single `Err` that ends the stream.
///
/// Already existing output files are never overwritten, so re-running an
/// export only fills in what is missing.
pub fn export<'a>(request: &'a ExportRequest, ctx: &'a Context) -> impl Stream<Item = Result<ExportEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        let (account, mut metadata, mut media) = match start(request).await {
            Ok(opened) => opened,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        yield Ok(ExportEvent::Started { account: account.clone() });

        let params = [Value::from(account.as_str()), Value::from(VOICE_MESSAGE_TYPE)];
        let count = match metadata
            .select_count(COUNT_CANDIDATES, &params)
            .await
            .or_raise(|| ErrorKind::Query("counting voice messages"))
        {
            // Infallible: a count is never negative.
            Ok(count) => u64::try_from(count).unwrap_or(0),
            Err(e) => {
                close(&mut metadata, &mut media).await;
                yield Err(e);
                return;
            },
        };
        if count == 0 {
            close(&mut metadata, &mut media).await;
            yield Ok(ExportEvent::NoCandidates { account });
            return;
        }
        yield Ok(ExportEvent::CandidatesFound(count));

        let directory = request.destination.join(&account);
        if let Err(e) = tokio::fs::create_dir_all(&directory).await.or_raise(|| ErrorKind::Destination(directory.clone())) {
            close(&mut metadata, &mut media).await;
            yield Err(e);
            return;
        }

        let mut exported = 0u64;
        let mut failure = None;
        {
            let mut candidates = pin!(metadata.select_all(LIST_CANDIDATES, &params));
            while let Some(row) = candidates.next().await {
                let id = match row.or_raise(|| ErrorKind::Query("listing voice messages")).and_then(|row| message_id(&row)) {
                    Ok(id) => id,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    },
                };
                let outcome = match export_message(&mut media, ctx, &directory, &request.format, request.sample_rate, id).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    },
                };
                yield Ok(match outcome {
                    Outcome::Skipped(path) => ExportEvent::Skipped { id, path },
                    Outcome::NotFound => ExportEvent::NotFound { id },
                    Outcome::Failed(status) => ExportEvent::Failed { id, status },
                    Outcome::Exported(path) => {
                        exported += 1;
                        ExportEvent::Exported { id, path, exported }
                    },
                });
            }
        }
        if let Some(e) = failure {
            close(&mut metadata, &mut media).await;
            yield Err(e);
            return;
        }

        yield Ok(ExportEvent::Complete { exported, directory: directory.clone() });
        if exported > 0 {
            ctx.reveal.reveal(&directory);
        }
        close(&mut metadata, &mut media).await;
    })
}

/// Resolve the account and open the metadata and media shards.
async fn start(request: &ExportRequest) -> Result<(String, QueryAggregator, QueryAggregator)> {
    let sources = &request.sources;
    let account = match &sources.contacts_prefix {
        Some(prefix) => account::resolve(&request.root, prefix, &sources.extension, &request.account).await?,
        None => request.account.clone(),
    };
    account::check_directory_name(&account)?;

    let mut metadata = open_shards(&request.root, &sources.metadata_prefix, &sources.extension).await?;
    let media = match open_shards(&request.root, &sources.media_prefix, &sources.extension).await {
        Ok(media) => media,
        Err(e) => {
            metadata.close().await;
            return Err(e);
        },
    };
    tracing::debug!(
        account = %account,
        metadata = metadata.shards().len(),
        media = media.shards().len(),
        "Opened shards"
    );
    Ok((account, metadata, media))
}

pub(crate) async fn open_shards(root: &Path, prefix: &str, extension: &str) -> Result<QueryAggregator> {
    let files = match discover_with_extension(root, prefix, extension).await {
        Ok(files) => files,
        Err(err) => {
            let kind = match &*err {
                ShardErrorKind::NoShardsFound(..) => ErrorKind::NoShards(prefix.to_string()),
                _ => ErrorKind::Shards(prefix.to_string()),
            };
            return Err(err.raise(kind));
        },
    };
    let shards = ShardSet::open(files).await.or_raise(|| ErrorKind::Shards(prefix.to_string()))?;
    Ok(QueryAggregator::from(shards))
}

fn message_id(row: &Row) -> Result<i64> {
    row.get::<i64>("MsgSvrID").or_raise(|| ErrorKind::InvalidCandidate)
}

async fn close(metadata: &mut QueryAggregator, media: &mut QueryAggregator) {
    metadata.close().await;
    media.close().await;
}
