//! Audio transcoding behind a status-code contract.
//!
//! The actual codec work happens elsewhere: a native library, a separate
//! program, anything that can turn an input buffer into an output file at a
//! given sample rate. This crate only defines the boundary ([`Transcoder`])
//! plus an implementation that shells out to an external program
//! ([`CommandTranscoder`]).

mod command;
pub mod error;
#[cfg(feature = "mock")]
mod mock;

pub use crate::command::{CommandTranscoder, DEFAULT_ARGS, DEFAULT_PROGRAM};
#[cfg(feature = "mock")]
pub use crate::mock::MockTranscoder;
use derive_more::Display;
use std::path::Path;

/// Sample rate the voice messages are encoded with.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Outcome of a single transcode: zero is success, anything else a failure.
///
/// On failure nothing is promised about the output file. It may be missing,
/// empty, or truncated; callers must not treat it as usable.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[display("{_0}")]
pub struct Status(pub i32);
impl Status {
    pub const SUCCESS: Self = Self(0);
    /// Used when the transcoder couldn't run at all (spawn failure, killed
    /// by a signal, temporary file trouble).
    pub const NOT_RUN: Self = Self(-1);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

/// Converts one encoded audio payload into an output file.
///
/// Implementations are blocking: call from a worker thread, not from an
/// async executor's core threads.
pub trait Transcoder: Send + Sync {
    /// Transcode an in-memory payload into `output`.
    fn transcode(&self, input: &[u8], output: &Path, sample_rate: u32) -> Status;

    /// Transcode a payload that is already on disk.
    ///
    /// Default implementation reads the whole file and hands it to
    /// [`transcode`](Self::transcode).
    fn transcode_file(&self, input: &Path, output: &Path, sample_rate: u32) -> Status {
        match std::fs::read(input) {
            Ok(bytes) => self.transcode(&bytes, output, sample_rate),
            Err(err) => {
                tracing::warn!(input = %input.display(), error = %err, "Could not read transcoder input");
                Status::NOT_RUN
            },
        }
    }
}
