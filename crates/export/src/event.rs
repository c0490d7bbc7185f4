use derive_more::Display;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use voxport_transcode::Status;

/// Where a run is in its lifecycle.
///
/// States only move forward:
/// `Starting → CountingCandidates → Exporting → Finalizing → Done`, with
/// `CountingCandidates → NoCandidates` when there is nothing to export. A
/// fatal error moves the run to `Failed` from whichever state it was in.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExportState {
    #[display("starting")]
    Starting,
    #[display("counting candidates")]
    CountingCandidates,
    #[display("exporting")]
    Exporting,
    #[display("finalizing")]
    Finalizing,
    #[display("done")]
    Done,
    #[display("no candidates")]
    NoCandidates,
    #[display("failed")]
    Failed,
}
impl ExportState {
    /// `Done`, `NoCandidates` and `Failed` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::NoCandidates | Self::Failed)
    }
}

/// Progress events emitted by [`export`](crate::export).
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once, after the databases are open.
/// 2. Either [`NoCandidates`](Self::NoCandidates), which ends the run, or
///    [`CandidatesFound`](Self::CandidatesFound) with the total count.
/// 3. One of [`Skipped`](Self::Skipped), [`NotFound`](Self::NotFound),
///    [`Failed`](Self::Failed) or [`Exported`](Self::Exported) per candidate.
/// 4. [`Complete`](Self::Complete): exactly once. The run is then
///    finalizing: the output directory is revealed and the databases are
///    closed before the stream ends, at which point the run is done.
///
/// A fatal error terminates the stream early. The background
/// [worker](crate::spawn) reports that as a final [`Aborted`](Self::Aborted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    Started { account: String },
    /// The account has no incoming voice messages. Nothing was written.
    NoCandidates { account: String },
    CandidatesFound(u64),
    /// The output file already existed and was left untouched.
    Skipped { id: i64, path: PathBuf },
    /// No media shard holds a payload for the message.
    NotFound { id: i64 },
    /// The transcoder returned a non-zero status; any partial output was removed.
    Failed { id: i64, status: Status },
    /// `exported` is the running total of successful exports, this one included.
    Exported { id: i64, path: PathBuf, exported: u64 },
    Complete { exported: u64, directory: PathBuf },
    Aborted { during: ExportState, reason: String },
}

impl ExportEvent {
    /// The state the run is in once this event has been emitted.
    ///
    /// No event moves a run to [`ExportState::Done`]: that happens when the
    /// stream ends after [`Complete`](Self::Complete).
    pub fn state(&self) -> ExportState {
        match self {
            Self::Started { .. } => ExportState::CountingCandidates,
            Self::NoCandidates { .. } => ExportState::NoCandidates,
            Self::CandidatesFound(_)
            | Self::Skipped { .. }
            | Self::NotFound { .. }
            | Self::Failed { .. }
            | Self::Exported { .. } => ExportState::Exporting,
            Self::Complete { .. } => ExportState::Finalizing,
            Self::Aborted { .. } => ExportState::Failed,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap_or(path.as_os_str()).to_string_lossy().into_owned()
}

impl std::fmt::Display for ExportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started { account } => write!(f, "Exporting voice messages for {account}"),
            Self::NoCandidates { account } => write!(f, "No voice messages found for {account}"),
            Self::CandidatesFound(1) => write!(f, "Found 1 voice message"),
            Self::CandidatesFound(count) => write!(f, "Found {count} voice messages"),
            Self::Skipped { id, path } => write!(f, "Message {id}: {} already exists, skipping", file_name(path)),
            Self::NotFound { id } => write!(f, "Message {id}: no voice data found"),
            Self::Failed { id, status } => write!(f, "Message {id}: transcoding failed with status {status}"),
            Self::Exported { path, exported, .. } => write!(f, "Exported {} ({exported})", file_name(path)),
            Self::Complete { exported, directory } => {
                write!(f, "Export complete: {exported} exported to {}", directory.display())
            },
            Self::Aborted { during, reason } => write!(f, "Export failed while {during}: {reason}"),
        }
    }
}

/// An [`ExportEvent`] as delivered to observers of a background run.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("{event}")]
pub struct Progress {
    /// Starts at zero and increases by one per event.
    pub sequence: u64,
    pub at: UtcDateTime,
    pub event: ExportEvent,
}
