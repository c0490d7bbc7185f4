//! Voice message export.
//!
//! Finds every incoming voice message for one account in the sharded message
//! databases, fetches each payload from the sharded media databases, and
//! transcodes it to `<destination>/<account>/<message id>.<format>`.
//!
//! [`export`] is the pipeline itself, a stream of [`ExportEvent`]s that can be
//! driven from any async context. [`spawn`] runs that stream on a dedicated
//! background thread and hands back an [`ExportHandle`] to observe it.

pub mod error;
mod event;
mod pipeline;
mod reveal;
mod worker;

pub use crate::event::{ExportEvent, ExportState, Progress};
pub use crate::pipeline::export;
pub use crate::reveal::{NoReveal, Reveal, SystemOpener};
pub use crate::worker::{ExportHandle, Summary, spawn};
use std::path::PathBuf;
use std::sync::Arc;
use voxport_shard::SHARD_EXTENSION;
use voxport_transcode::{DEFAULT_SAMPLE_RATE, Transcoder};

/// Message type of voice messages in the metadata shards.
pub const VOICE_MESSAGE_TYPE: i64 = 34;

/// File name prefixes of the three shard families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sources {
    pub metadata_prefix: String,
    pub media_prefix: String,
    /// `None` skips account resolution and uses the account exactly as given.
    pub contacts_prefix: Option<String>,
    pub extension: String,
}
impl Default for Sources {
    fn default() -> Self {
        Self {
            metadata_prefix: "MSG".to_string(),
            media_prefix: "MediaMSG".to_string(),
            contacts_prefix: Some("MicroMsg".to_string()),
            extension: SHARD_EXTENSION.to_string(),
        }
    }
}

/// Everything that identifies one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Account identifier, or (with contact resolution) an alias for one.
    pub account: String,
    /// Directory searched recursively for shard files.
    pub root: PathBuf,
    pub destination: PathBuf,
    pub sources: Sources,
    pub sample_rate: u32,
    /// Output file extension, without the dot.
    pub format: String,
}
impl ExportRequest {
    pub fn new(account: impl Into<String>, root: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            account: account.into(),
            root: root.into(),
            destination: destination.into(),
            sources: Sources::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            format: "mp3".to_string(),
        }
    }
}

/// Collaborators shared by every message of a run.
#[derive(Clone)]
pub struct Context {
    pub transcoder: Arc<dyn Transcoder>,
    pub reveal: Arc<dyn Reveal>,
}
impl Context {
    /// A context that never reveals the output directory.
    pub fn new(transcoder: impl Transcoder + 'static) -> Self {
        Self { transcoder: Arc::new(transcoder), reveal: Arc::new(NoReveal) }
    }

    pub fn with_reveal(mut self, reveal: impl Reveal + 'static) -> Self {
        self.reveal = Arc::new(reveal);
        self
    }
}
