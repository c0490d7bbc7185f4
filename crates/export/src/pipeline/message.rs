use crate::Context;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;
use voxport_shard::{QueryAggregator, Value};
use voxport_transcode::Status;

const GET_MEDIA: &str = include_str!("../../queries/get_media.sql");

/// What happened to a single voice message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Skipped(PathBuf),
    NotFound,
    Failed(Status),
    Exported(PathBuf),
}

/// Export one message to `<directory>/<id>.<format>`.
///
/// Missing media and transcoder failures are outcomes, not errors. Only a
/// failing query or an unusable destination is fatal.
#[instrument(skip(media, ctx, directory, format))]
pub(crate) async fn export_message(
    media: &mut QueryAggregator,
    ctx: &Context,
    directory: &Path,
    format: &str,
    sample_rate: u32,
    id: i64,
) -> Result<Outcome> {
    let path = directory.join(format!("{id}.{format}"));
    if tokio::fs::try_exists(&path).await.or_raise(|| ErrorKind::Destination(path.clone()))? {
        tracing::debug!(path = %path.display(), "Output already exists");
        return Ok(Outcome::Skipped(path));
    }

    let params = [Value::from(id)];
    let row = media.select_one(GET_MEDIA, &params).await.or_raise(|| ErrorKind::Query("looking up voice data"))?;
    let Some(Value::Blob(payload)) = row.and_then(|mut row| row.take("Buf")) else {
        tracing::debug!("No voice data");
        return Ok(Outcome::NotFound);
    };

    let transcoder = Arc::clone(&ctx.transcoder);
    let output = path.clone();
    let status = tokio::task::spawn_blocking(move || transcoder.transcode(&payload, &output, sample_rate))
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Transcoder task did not complete");
            Status::NOT_RUN
        });
    if status.is_success() {
        return Ok(Outcome::Exported(path));
    }

    tracing::debug!(%status, "Transcoding failed");
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "Could not remove partial output"),
    }
    Ok(Outcome::Failed(status))
}
