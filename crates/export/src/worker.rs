//! Running an export off the caller's thread.

use crate::error::{ErrorKind, Result};
use crate::event::{ExportEvent, ExportState, Progress};
use crate::{Context, ExportRequest, export};
use exn::ResultExt;
use futures::StreamExt;
use std::pin::pin;
use std::thread::JoinHandle;
use time::UtcDateTime;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Per-outcome totals of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// The resolved account, once known.
    pub account: Option<String>,
    /// Where the run ended: [`Done`](ExportState::Done) or
    /// [`NoCandidates`](ExportState::NoCandidates).
    pub state: ExportState,
    pub candidates: u64,
    pub exported: u64,
    pub skipped: u64,
    pub not_found: u64,
    pub failed: u64,
}
impl Default for Summary {
    fn default() -> Self {
        Self {
            account: None,
            state: ExportState::Starting,
            candidates: 0,
            exported: 0,
            skipped: 0,
            not_found: 0,
            failed: 0,
        }
    }
}
impl Summary {
    fn record(&mut self, event: &ExportEvent) {
        self.state = event.state();
        match event {
            ExportEvent::Started { account } => self.account = Some(account.clone()),
            ExportEvent::CandidatesFound(count) => self.candidates = *count,
            ExportEvent::Skipped { .. } => self.skipped += 1,
            ExportEvent::NotFound { .. } => self.not_found += 1,
            ExportEvent::Failed { .. } => self.failed += 1,
            ExportEvent::Exported { exported, .. } => self.exported = *exported,
            ExportEvent::NoCandidates { .. } | ExportEvent::Complete { .. } | ExportEvent::Aborted { .. } => {},
        }
    }
}

/// A run in progress on its own thread.
///
/// Events arrive in order, one [`Progress`] per [`ExportEvent`]. If the run
/// fails, the last event is an [`ExportEvent::Aborted`] and
/// [`join`](Self::join) returns the error. Dropping the handle detaches the
/// run; it carries on to completion with nobody listening.
pub struct ExportHandle {
    events: UnboundedReceiver<Progress>,
    worker: JoinHandle<Result<Summary>>,
}
impl ExportHandle {
    /// The next event, or `None` once the run is over.
    pub async fn next(&mut self) -> Option<Progress> {
        self.events.recv().await
    }

    /// Like [`next`](Self::next), for callers outside any async runtime.
    ///
    /// # Panics
    /// When called from within an async execution context.
    pub fn blocking_next(&mut self) -> Option<Progress> {
        self.events.blocking_recv()
    }

    /// Wait for the run to finish.
    pub fn join(self) -> Result<Summary> {
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => Err(exn::Exn::from(ErrorKind::Worker)),
        }
    }
}

/// Start exporting on a dedicated thread with its own single-threaded
/// runtime, so the caller stays free to render progress.
pub fn spawn(request: ExportRequest, ctx: Context) -> Result<ExportHandle> {
    let (tx, events) = unbounded_channel();
    let worker = std::thread::Builder::new()
        .name("voxport-export".to_string())
        .spawn(move || run(&request, &ctx, Reporter::new(tx)))
        .or_raise(|| ErrorKind::Worker)?;
    Ok(ExportHandle { events, worker })
}

struct Reporter {
    tx: UnboundedSender<Progress>,
    sequence: u64,
}
impl Reporter {
    fn new(tx: UnboundedSender<Progress>) -> Self {
        Self { tx, sequence: 0 }
    }

    fn send(&mut self, event: ExportEvent) {
        let progress = Progress { sequence: self.sequence, at: UtcDateTime::now(), event };
        self.sequence += 1;
        // Nobody listening is fine; the run still finishes.
        _ = self.tx.send(progress);
    }
}

fn run(request: &ExportRequest, ctx: &Context, mut reporter: Reporter) -> Result<Summary> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            reporter.send(ExportEvent::Aborted { during: ExportState::Starting, reason: err.to_string() });
            return Err(err).or_raise(|| ErrorKind::Worker);
        },
    };
    runtime.block_on(drive(request, ctx, &mut reporter))
}

async fn drive(request: &ExportRequest, ctx: &Context, reporter: &mut Reporter) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut events = pin!(export(request, ctx));
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                tracing::info!(%event);
                summary.record(&event);
                reporter.send(event);
            },
            Err(err) => {
                let during = summary.state;
                tracing::error!(%during, error = ?err, "Export aborted");
                reporter.send(ExportEvent::Aborted { during, reason: (*err).to_string() });
                return Err(err);
            },
        }
    }
    // The stream ending after the summary is what completes a run.
    if summary.state == ExportState::Finalizing {
        summary.state = ExportState::Done;
    }
    Ok(summary)
}
