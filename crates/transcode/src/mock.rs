//! Scriptable transcoder for testing.

use crate::{Status, Transcoder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-process transcoder for tests.
///
/// Successful transcodes copy the input bytes verbatim to the output path.
/// Outputs registered with [`fail_for`](Self::fail_for) get a truncated
/// "partial" file written and return the configured status instead, which
/// mimics a real codec dying half way through.
///
/// ```
/// use voxport_transcode::{MockTranscoder, Status, Transcoder};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mock = MockTranscoder::default().fail_for("broken", 2);
/// assert!(mock.transcode(b"ok", &dir.path().join("fine.mp3"), 24_000).is_success());
/// assert_eq!(mock.transcode(b"ok", &dir.path().join("broken.mp3"), 24_000), Status(2));
/// assert_eq!(mock.calls().len(), 2);
/// ```
#[derive(Default)]
pub struct MockTranscoder {
    failures: HashMap<String, i32>,
    calls: Mutex<Vec<(PathBuf, u32)>>,
}
impl MockTranscoder {
    /// Fail any output whose file stem is `stem`, returning `code`.
    pub fn fail_for(mut self, stem: impl Into<String>, code: i32) -> Self {
        self.failures.insert(stem.into(), code);
        self
    }

    /// Every `(output, sample_rate)` pair seen so far, in call order.
    pub fn calls(&self) -> Vec<(PathBuf, u32)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}
impl Transcoder for MockTranscoder {
    fn transcode(&self, input: &[u8], output: &Path, sample_rate: u32) -> Status {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((output.to_path_buf(), sample_rate));
        }
        let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if let Some(code) = self.failures.get(stem) {
            let partial = &input[..input.len() / 2];
            _ = std::fs::write(output, partial);
            return Status(*code);
        }
        match std::fs::write(output, input) {
            Ok(()) => Status::SUCCESS,
            Err(_) => Status::NOT_RUN,
        }
    }
}
