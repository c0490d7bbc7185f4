use futures::StreamExt;
use rstest::rstest;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use voxport_export::error::{ErrorKind, Result};
use voxport_export::{Context, ExportEvent, ExportRequest, ExportState, Reveal, Sources, Summary, export, spawn};
use voxport_shard::fixtures::create_shard;
use voxport_transcode::{MockTranscoder, Status};

const MSG_SCHEMA: &str =
    "CREATE TABLE MSG (localId INTEGER PRIMARY KEY, MsgSvrID INTEGER, Type INTEGER, IsSender INTEGER, StrTalker TEXT)";
const MEDIA_SCHEMA: &str = "CREATE TABLE Media (Key TEXT, Reserved0 INTEGER, Buf BLOB)";

#[derive(Default)]
struct RecordReveal(Mutex<Vec<PathBuf>>);
impl RecordReveal {
    fn revealed(&self) -> Vec<PathBuf> {
        self.0.lock().unwrap().clone()
    }
}
impl Reveal for RecordReveal {
    fn reveal(&self, directory: &Path) {
        self.0.lock().unwrap().push(directory.to_path_buf());
    }
}

/// Three incoming voice messages for `wxid_a` spread over two metadata
/// shards, plus noise that must never be exported: a text message, a voice
/// message `wxid_a` sent themselves, and a voice message from someone else.
///
/// Message 101 has media, 103 has media, 102 only has media when
/// `media_for_102` is set.
async fn databases(root: &Path, media_for_102: bool) {
    let multi = root.join("Multi");
    std::fs::create_dir_all(&multi).unwrap();
    create_shard(
        root.join("MicroMsg.db"),
        &[
            "CREATE TABLE Contact (UserName TEXT, Alias TEXT)",
            "INSERT INTO Contact VALUES ('wxid_a', 'alice'), ('wxid_b', 'bob'), ('wxid_quiet', NULL)",
        ],
    )
    .await;
    create_shard(
        multi.join("MSG0.db"),
        &[
            MSG_SCHEMA,
            "INSERT INTO MSG (MsgSvrID, Type, IsSender, StrTalker) VALUES
                (101, 34, 0, 'wxid_a'),
                (900, 1, 0, 'wxid_a'),
                (102, 34, 0, 'wxid_a'),
                (901, 34, 1, 'wxid_a'),
                (902, 34, 0, 'wxid_b')",
        ],
    )
    .await;
    create_shard(multi.join("MSG1.db"), &[MSG_SCHEMA, "INSERT INTO MSG (MsgSvrID, Type, IsSender, StrTalker) VALUES (103, 34, 0, 'wxid_a')"])
        .await;
    create_shard(
        multi.join("MediaMSG0.db"),
        &[MEDIA_SCHEMA, "INSERT INTO Media VALUES ('k1', 101, x'0A0B0C0D'), ('k9', 902, x'09')"],
    )
    .await;
    let mut media1 = vec![MEDIA_SCHEMA, "INSERT INTO Media VALUES ('k3', 103, x'0303')"];
    if media_for_102 {
        media1.push("INSERT INTO Media VALUES ('k2', 102, x'02020202')");
    }
    create_shard(multi.join("MediaMSG1.db"), &media1).await;
}

fn context(transcoder: &Arc<MockTranscoder>, reveal: &Arc<RecordReveal>) -> Context {
    Context { transcoder: transcoder.clone(), reveal: reveal.clone() }
}

async fn run(request: &ExportRequest, ctx: &Context) -> Vec<Result<ExportEvent>> {
    export(request, ctx).collect().await
}

fn unwrap_all(events: Vec<Result<ExportEvent>>) -> Vec<ExportEvent> {
    events.into_iter().map(|e| e.unwrap()).collect()
}

#[rstest]
#[case::by_account("wxid_a")]
#[case::by_alias("alice")]
#[tokio::test]
async fn test_exports_found_skips_existing_reports_missing(#[case] account: &str) {
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    databases(&root, false).await;
    let directory = dest.join("wxid_a");
    std::fs::create_dir_all(&directory).unwrap();
    std::fs::write(directory.join("103.mp3"), b"earlier").unwrap();

    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let request = ExportRequest::new(account, &root, &dest);
    let events = unwrap_all(run(&request, &context(&mock, &reveal)).await);

    assert_eq!(
        events,
        [
            ExportEvent::Started { account: "wxid_a".into() },
            ExportEvent::CandidatesFound(3),
            ExportEvent::Exported { id: 101, path: directory.join("101.mp3"), exported: 1 },
            ExportEvent::NotFound { id: 102 },
            ExportEvent::Skipped { id: 103, path: directory.join("103.mp3") },
            ExportEvent::Complete { exported: 1, directory: directory.clone() },
        ]
    );
    assert_eq!(std::fs::read(directory.join("101.mp3")).unwrap(), [0x0A, 0x0B, 0x0C, 0x0D]);
    assert!(!directory.join("102.mp3").exists());
    assert_eq!(std::fs::read(directory.join("103.mp3")).unwrap(), b"earlier");
    assert_eq!(mock.calls(), [(directory.join("101.mp3"), 24_000)]);
    assert_eq!(reveal.revealed(), [directory]);
}

#[tokio::test]
async fn test_no_candidates_writes_nothing() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    std::fs::create_dir_all(&root).unwrap();
    create_shard(root.join("MSG0.db"), &[MSG_SCHEMA, "INSERT INTO MSG (MsgSvrID, Type, IsSender, StrTalker) VALUES (1, 1, 0, 'wxid_quiet')"])
        .await;
    // Would fail any media lookup: there is no Media table.
    create_shard(root.join("MediaMSG0.db"), &["CREATE TABLE Unrelated (id INTEGER)"]).await;

    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let mut request = ExportRequest::new("wxid_quiet", &root, &dest);
    request.sources.contacts_prefix = None;
    let events = unwrap_all(run(&request, &context(&mock, &reveal)).await);

    assert_eq!(
        events,
        [
            ExportEvent::Started { account: "wxid_quiet".into() },
            ExportEvent::NoCandidates { account: "wxid_quiet".into() },
        ]
    );
    assert!(!dest.exists());
    assert!(mock.calls().is_empty());
    assert!(reveal.revealed().is_empty());
}

#[tokio::test]
async fn test_transcoder_failure_removes_partial_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    databases(&root, true).await;
    let directory = dest.join("wxid_a");

    let mock = Arc::new(MockTranscoder::default().fail_for("102", 3));
    let reveal = Arc::new(RecordReveal::default());
    let request = ExportRequest::new("wxid_a", &root, &dest);
    let events = unwrap_all(run(&request, &context(&mock, &reveal)).await);

    assert_eq!(
        events[2..],
        [
            ExportEvent::Exported { id: 101, path: directory.join("101.mp3"), exported: 1 },
            ExportEvent::Failed { id: 102, status: Status(3) },
            ExportEvent::Exported { id: 103, path: directory.join("103.mp3"), exported: 2 },
            ExportEvent::Complete { exported: 2, directory: directory.clone() },
        ]
    );
    assert!(!directory.join("102.mp3").exists());
    assert_eq!(mock.calls().len(), 3);
}

#[tokio::test]
async fn test_rerun_only_skips() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    databases(&root, true).await;
    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let mut request = ExportRequest::new("wxid_a", &root, &dest);
    request.sample_rate = 16_000;
    request.format = "ogg".to_string();
    let ctx = context(&mock, &reveal);

    let first = unwrap_all(run(&request, &ctx).await);
    assert_eq!(first.last(), Some(&ExportEvent::Complete { exported: 3, directory: dest.join("wxid_a") }));
    let second = unwrap_all(run(&request, &ctx).await);
    assert!(second[2..5].iter().all(|e| matches!(e, ExportEvent::Skipped { .. })));
    assert_eq!(second.last(), Some(&ExportEvent::Complete { exported: 0, directory: dest.join("wxid_a") }));

    // Only the first run transcoded or revealed anything.
    assert_eq!(mock.calls().len(), 3);
    assert!(mock.calls().iter().all(|(path, rate)| *rate == 16_000 && path.extension().unwrap() == "ogg"));
    assert_eq!(reveal.revealed().len(), 1);
}

#[tokio::test]
async fn test_unknown_account_is_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    databases(&root, false).await;
    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let request = ExportRequest::new("mallory", &root, &dest);
    let mut events = run(&request, &context(&mock, &reveal)).await;

    assert_eq!(events.len(), 1);
    let err = events.remove(0).unwrap_err();
    assert!(matches!(&*err, ErrorKind::AccountNotFound(a) if a == "mallory"));
    assert!(!dest.exists());
}

#[rstest]
#[case::no_contacts(Some("MicroMsg"), "MicroMsg")]
#[case::no_metadata(None, "MSG")]
#[tokio::test]
async fn test_missing_shards_are_fatal(#[case] contacts: Option<&str>, #[case] missing: &str) {
    let temp_dir = tempfile::tempdir().unwrap();
    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let mut request = ExportRequest::new("wxid_a", temp_dir.path(), temp_dir.path().join("out"));
    request.sources = Sources { contacts_prefix: contacts.map(String::from), ..Sources::default() };
    let mut events = run(&request, &context(&mock, &reveal)).await;

    assert_eq!(events.len(), 1);
    let err = events.remove(0).unwrap_err();
    assert!(matches!(&*err, ErrorKind::NoShards(prefix) if prefix == missing));
}

#[tokio::test]
async fn test_failing_count_ends_run() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().join("db");
    databases(&root, false).await;
    // A metadata shard without the MSG table.
    create_shard(root.join("MSG2.db"), &["CREATE TABLE Other (id INTEGER)"]).await;
    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let request = ExportRequest::new("wxid_a", &root, temp_dir.path().join("out"));
    let events = run(&request, &context(&mock, &reveal)).await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], Ok(ExportEvent::Started { .. })));
    let err = events[1].as_ref().unwrap_err();
    assert!(matches!(&**err, ErrorKind::Query(_)));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_summary_comes_before_reveal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    databases(&root, true).await;
    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let request = ExportRequest::new("wxid_a", &root, &dest);
    let ctx = context(&mock, &reveal);
    let mut events = std::pin::pin!(export(&request, &ctx));

    loop {
        let event = events.next().await.unwrap().unwrap();
        if matches!(event, ExportEvent::Complete { .. }) {
            break;
        }
    }
    assert!(reveal.revealed().is_empty());
    assert!(events.next().await.is_none());
    assert_eq!(reveal.revealed(), [dest.join("wxid_a")]);
}

/// `wxid_a` has one exportable message followed by a row without a message id.
async fn databases_with_null_id(root: &Path) {
    std::fs::create_dir_all(root).unwrap();
    create_shard(
        root.join("MSG0.db"),
        &[
            MSG_SCHEMA,
            "INSERT INTO MSG (MsgSvrID, Type, IsSender, StrTalker) VALUES
                (101, 34, 0, 'wxid_a'),
                (NULL, 34, 0, 'wxid_a'),
                (103, 34, 0, 'wxid_a')",
        ],
    )
    .await;
    create_shard(
        root.join("MediaMSG0.db"),
        &[MEDIA_SCHEMA, "INSERT INTO Media VALUES ('k1', 101, x'01'), ('k3', 103, x'03')"],
    )
    .await;
}

#[tokio::test]
async fn test_missing_message_id_ends_run() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    databases_with_null_id(&root).await;
    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let mut request = ExportRequest::new("wxid_a", &root, &dest);
    request.sources.contacts_prefix = None;
    let mut events = run(&request, &context(&mock, &reveal)).await;

    assert_eq!(events.len(), 4);
    let err = events.pop().unwrap().unwrap_err();
    assert!(matches!(&*err, ErrorKind::InvalidCandidate));
    assert_eq!(
        unwrap_all(events),
        [
            ExportEvent::Started { account: "wxid_a".into() },
            ExportEvent::CandidatesFound(3),
            ExportEvent::Exported { id: 101, path: dest.join("wxid_a").join("101.mp3"), exported: 1 },
        ]
    );
    // Nothing after the bad row is attempted, and nothing is revealed.
    assert_eq!(mock.calls().len(), 1);
    assert!(!dest.join("wxid_a").join("103.mp3").exists());
    assert!(reveal.revealed().is_empty());
}

#[test]
fn test_background_run_aborts_while_exporting() {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    runtime.block_on(databases_with_null_id(&root));
    drop(runtime);

    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let mut request = ExportRequest::new("wxid_a", &root, &dest);
    request.sources.contacts_prefix = None;
    let mut handle = spawn(request, context(&mock, &reveal)).unwrap();
    let progress: Vec<_> = std::iter::from_fn(|| handle.blocking_next()).collect();
    let err = handle.join().unwrap_err();

    assert!(matches!(&*err, ErrorKind::InvalidCandidate));
    assert_eq!(progress.len(), 4);
    let last = &progress[3].event;
    assert!(matches!(last, ExportEvent::Aborted { during: ExportState::Exporting, .. }));
    assert_eq!(last.state(), ExportState::Failed);
}

#[test]
fn test_background_run_without_candidates() {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    runtime.block_on(databases(&root, false));
    drop(runtime);

    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let mut handle = spawn(ExportRequest::new("wxid_quiet", &root, &dest), context(&mock, &reveal)).unwrap();
    let progress: Vec<_> = std::iter::from_fn(|| handle.blocking_next()).collect();
    let summary = handle.join().unwrap();

    assert_eq!(progress.len(), 2);
    assert_eq!(summary.state, ExportState::NoCandidates);
    assert_eq!(summary.exported, 0);
}

#[test]
fn test_background_run() {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let temp_dir = tempfile::tempdir().unwrap();
    let (root, dest) = (temp_dir.path().join("db"), temp_dir.path().join("out"));
    runtime.block_on(databases(&root, true));
    drop(runtime);

    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let mut handle = spawn(ExportRequest::new("alice", &root, &dest), context(&mock, &reveal)).unwrap();
    let progress: Vec<_> = std::iter::from_fn(|| handle.blocking_next()).collect();
    let summary = handle.join().unwrap();

    assert!(progress.iter().enumerate().all(|(i, p)| p.sequence == i as u64));
    assert_eq!(progress.len(), 6);
    assert_eq!(progress[0].to_string(), "Exporting voice messages for wxid_a");
    assert_eq!(
        summary,
        Summary {
            account: Some("wxid_a".into()),
            state: ExportState::Done,
            candidates: 3,
            exported: 3,
            skipped: 0,
            not_found: 0,
            failed: 0,
        }
    );
}

#[test]
fn test_background_run_reports_abort() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (mock, reveal) = (Arc::new(MockTranscoder::default()), Arc::new(RecordReveal::default()));
    let mut handle = spawn(ExportRequest::new("wxid_a", temp_dir.path(), temp_dir.path()), context(&mock, &reveal)).unwrap();
    let progress: Vec<_> = std::iter::from_fn(|| handle.blocking_next()).collect();
    let err = handle.join().unwrap_err();

    assert!(matches!(&*err, ErrorKind::NoShards(_)));
    assert_eq!(progress.len(), 1);
    assert!(matches!(
        &progress[0].event,
        ExportEvent::Aborted { during: ExportState::Starting, reason } if reason.contains("MicroMsg")
    ));
}
