use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use parking_lot::Mutex;

use dav_checkout::{
    cancellation, CancelHandle, CancelToken, CheckinError, CheckoutEvent, CheckoutSession,
    Coordinator, DavError, DavMethod, Direction, DocumentRef, EventSink, MemTransport,
    SessionState, Severity, TransportError,
};

const URL: &str = "http://host/silverpeas/repository/doc lib/My File.odt";
const CONTENT: &[u8] = b"PK\x03\x04 some office document, not very long";

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

impl EventSink for Recorder {
    fn event(&self, event: &CheckoutEvent<'_>) {
        self.0.lock().push(format!("{event:?}"));
    }
}

// cancels the download as soon as the first bytes arrived.
struct CancelOnProgress(CancelHandle);

impl EventSink for CancelOnProgress {
    fn event(&self, event: &CheckoutEvent<'_>) {
        if let CheckoutEvent::Progress {
            direction: Direction::Download,
            transferred,
            ..
        } = event
        {
            if *transferred > 0 {
                self.0.cancel();
            }
        }
    }
}

// per-test directory for working copies, removed again on drop.
struct TempRoot(PathBuf);

impl TempRoot {
    fn new() -> TempRoot {
        let root = std::env::temp_dir().join(format!("davco-tests-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&root).unwrap();
        TempRoot(root)
    }
}

impl std::ops::Deref for TempRoot {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for TempRoot {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

fn setup(events: impl EventSink + 'static) -> (Arc<MemTransport>, Coordinator, TempRoot) {
    let mem = MemTransport::new();
    mem.insert(URL, CONTENT);
    let root = TempRoot::new();
    let coordinator = Coordinator::builder(mem.clone())
        .temp_root(root.to_path_buf())
        .events(events)
        .build();
    (mem, coordinator, root)
}

fn doc() -> DocumentRef {
    DocumentRef::parse(URL).unwrap()
}

async fn checkout(coordinator: &Coordinator) -> CheckoutSession {
    coordinator
        .checkout(doc(), "alice", &CancelToken::never())
        .await
        .unwrap()
}

#[tokio::test]
async fn checkout_downloads_whole_document() {
    let (mem, coordinator, root) = setup(Recorder::default());
    mem.set_chunk_size(7);

    let session = checkout(&coordinator).await;
    assert_eq!(session.state(), SessionState::Fetched);
    assert!(session.lock_token().is_some());

    let wc = session.working_copy().unwrap();
    assert_eq!(wc.file().file_name().unwrap(), "My_File.odt");
    assert!(wc.dir().starts_with(&root));
    assert!(wc
        .dir()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("silver-"));
    let data = std::fs::read(wc.file()).unwrap();
    assert_eq!(data.len(), CONTENT.len());
    assert_eq!(data, CONTENT);

    assert_eq!(mem.lock_owner(URL).as_deref(), Some("alice"));
    assert_eq!(mem.methods_used(), DavMethod::LOCK | DavMethod::GET);
}

#[tokio::test]
async fn round_trip_without_changes() {
    let recorder = Recorder::default();
    let (mem, coordinator, root) = setup(recorder.clone());

    let session = checkout(&coordinator).await;
    coordinator.checkin(session).await.unwrap();

    assert_eq!(mem.contents(URL).unwrap(), CONTENT);
    assert!(!mem.is_locked(URL));
    assert!(is_empty_dir(&root));
    let methods: Vec<_> = mem.calls().into_iter().map(|(m, _)| m).collect();
    assert_eq!(
        methods,
        vec![
            DavMethod::LOCK,
            DavMethod::GET,
            DavMethod::HEAD,
            DavMethod::PUT,
            DavMethod::UNLOCK
        ]
    );

    let events = recorder.events();
    for name in [
        "Locking",
        "LockAcquired",
        "FetchStarted",
        "FetchCompleted",
        "StoreStarted",
        "StoreCompleted",
        "Unlocked",
        "WorkingCopyRemoved",
    ] {
        assert!(
            events.iter().any(|e| e.starts_with(name)),
            "missing event {name}"
        );
    }
}

#[tokio::test]
async fn edits_are_uploaded() {
    let (mem, coordinator, _root) = setup(Recorder::default());

    let session = checkout(&coordinator).await;
    std::fs::write(session.working_copy().unwrap().file(), b"edited").unwrap();
    coordinator.checkin(session).await.unwrap();

    assert_eq!(mem.contents(URL).unwrap(), &b"edited"[..]);
    assert!(!mem.is_locked(URL));
}

#[tokio::test]
async fn second_checkout_is_already_locked() {
    let (mem, coordinator, _root) = setup(Recorder::default());

    let first = checkout(&coordinator).await;
    let second = coordinator
        .checkout(doc(), "bob", &CancelToken::never())
        .await;
    assert!(matches!(second, Err(DavError::AlreadyLocked)));

    // bob's attempt neither downloaded nor unlocked anything.
    assert_eq!(mem.count(DavMethod::GET), 1);
    assert_eq!(mem.count(DavMethod::UNLOCK), 0);
    assert_eq!(mem.lock_owner(URL).as_deref(), Some("alice"));

    coordinator.checkin(first).await.unwrap();
}

#[tokio::test]
async fn other_lock_failures() {
    let (mem, coordinator, root) = setup(Recorder::default());
    mem.fail_next(DavMethod::LOCK, StatusCode::FORBIDDEN);

    match coordinator.checkout(doc(), "alice", &CancelToken::never()).await {
        Err(e @ DavError::LockFailed { .. }) => {
            assert_eq!(e.status(), Some(StatusCode::FORBIDDEN));
            assert_eq!(e.to_string(), "locking failed: 403 - Forbidden");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(mem.methods_used(), DavMethod::LOCK);
    assert!(is_empty_dir(&root));
}

#[tokio::test]
async fn failed_fetch_releases_lock() {
    let (mem, coordinator, root) = setup(Recorder::default());
    mem.fail_next(DavMethod::GET, StatusCode::INTERNAL_SERVER_ERROR);

    let err = coordinator
        .checkout(doc(), "alice", &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::RemoteFetchFailed { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(mem.count(DavMethod::UNLOCK), 1);
    assert!(!mem.is_locked(URL));
    assert!(is_empty_dir(&root));
}

#[tokio::test]
async fn broken_connection_during_fetch_releases_lock() {
    let (mem, coordinator, _root) = setup(Recorder::default());
    mem.break_next(DavMethod::GET);

    let err = coordinator
        .checkout(doc(), "alice", &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::Transport(_)));
    assert!(!mem.is_locked(URL));
}

#[tokio::test]
async fn failed_compensating_unlock_keeps_original_error() {
    let recorder = Recorder::default();
    let (mem, coordinator, _root) = setup(recorder.clone());
    mem.fail_next(DavMethod::GET, StatusCode::NOT_FOUND);
    mem.break_next(DavMethod::UNLOCK);

    let err = coordinator
        .checkout(doc(), "alice", &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::RemoteFetchFailed { status, .. } if status == StatusCode::NOT_FOUND));
    assert_eq!(mem.count(DavMethod::UNLOCK), 1);
    assert!(recorder
        .events()
        .iter()
        .any(|e| e.starts_with("UnlockFailed") && e.contains("compensating: true")));
}

#[tokio::test]
async fn cancelled_fetch_unlocks() {
    let (handle, cancel) = cancellation();
    let (mem, coordinator, root) = setup(CancelOnProgress(handle));
    mem.set_chunk_size(4);
    mem.stall_next_get_after(4);

    let err = coordinator.checkout(doc(), "alice", &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    let calls = mem.calls();
    assert_eq!(calls.last().unwrap().0, DavMethod::UNLOCK);
    assert_eq!(calls.last().unwrap().1, doc().as_str());
    assert!(!mem.is_locked(URL));
    assert!(is_empty_dir(&root));
}

#[tokio::test]
async fn resource_gone_keeps_working_copy_and_lock() {
    let (mem, coordinator, _root) = setup(Recorder::default());

    let session = checkout(&coordinator).await;
    let path = session.working_copy().unwrap().file().to_path_buf();
    mem.remove(URL);

    let err = coordinator.checkin(session).await.unwrap_err();
    assert_eq!(err.severity(), Severity::DataAtRisk);
    assert!(matches!(err.error(), DavError::RemoteResourceGone));
    assert!(path.exists());
    assert_eq!(mem.count(DavMethod::PUT), 0);
    assert_eq!(mem.count(DavMethod::UNLOCK), 0);

    let session = err.into_session().unwrap();
    assert_eq!(session.state(), SessionState::Fetched);
    assert!(session.lock_token().is_some());
}

#[tokio::test]
async fn failed_store_can_be_retried() {
    let (mem, coordinator, root) = setup(Recorder::default());

    let session = checkout(&coordinator).await;
    std::fs::write(session.working_copy().unwrap().file(), b"second draft").unwrap();
    mem.fail_next(DavMethod::PUT, StatusCode::INSUFFICIENT_STORAGE);

    let err = coordinator.checkin(session).await.unwrap_err();
    match err.error() {
        DavError::RemoteStoreFailed { status, reason } => {
            assert_eq!(*status, StatusCode::INSUFFICIENT_STORAGE);
            assert_eq!(reason, "Insufficient Storage");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(mem.count(DavMethod::UNLOCK), 0);
    assert!(mem.is_locked(URL));
    assert_eq!(mem.contents(URL).unwrap(), CONTENT);

    let session = err.into_session().unwrap();
    assert!(session.working_copy().unwrap().file().exists());
    coordinator.checkin(session).await.unwrap();

    assert_eq!(mem.contents(URL).unwrap(), &b"second draft"[..]);
    assert!(!mem.is_locked(URL));
    assert!(is_empty_dir(&root));
}

#[tokio::test]
async fn failed_unlock_after_store_is_a_warning() {
    let (mem, coordinator, root) = setup(Recorder::default());

    let session = checkout(&coordinator).await;
    std::fs::write(session.working_copy().unwrap().file(), b"final").unwrap();
    mem.fail_next(DavMethod::UNLOCK, StatusCode::INTERNAL_SERVER_ERROR);

    let err = coordinator.checkin(session).await.unwrap_err();
    assert!(matches!(err, CheckinError::NotReleased { .. }));
    assert_eq!(err.severity(), Severity::Warning);
    assert!(matches!(err.error(), DavError::UnlockFailed(_)));
    assert!(err.into_session().is_none());

    assert_eq!(mem.contents(URL).unwrap(), &b"final"[..]);
    assert!(is_empty_dir(&root));
}

#[tokio::test]
async fn unlock_without_token_is_a_noop() {
    let (mem, coordinator, _root) = setup(Recorder::default());

    let mut session = checkout(&coordinator).await;
    coordinator.unlock(&mut session).await.unwrap();
    assert_eq!(session.state(), SessionState::Unlocked);
    assert!(session.lock_token().is_none());

    // again: nothing to release, nothing sent.
    coordinator.unlock(&mut session).await.unwrap();
    assert_eq!(mem.count(DavMethod::UNLOCK), 1);
    assert!(!mem.is_locked(URL));
}

#[tokio::test]
async fn operations_check_session_state() {
    let (mem, coordinator, _root) = setup(Recorder::default());

    let mut session = coordinator.lock(doc(), "alice").await.unwrap();
    assert_eq!(session.state(), SessionState::Locked);
    let err = coordinator.store(&mut session).await.unwrap_err();
    assert!(matches!(err, DavError::InvalidState { operation: "store", .. }));
    assert_eq!(mem.methods_used(), DavMethod::LOCK);

    let path = coordinator
        .fetch(&mut session, &CancelToken::never())
        .await
        .unwrap();
    assert!(path.exists());
    let err = coordinator
        .fetch(&mut session, &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::InvalidState { operation: "fetch", .. }));

    coordinator.store(&mut session).await.unwrap();
    assert_eq!(session.state(), SessionState::Stored);
    coordinator.unlock(&mut session).await.unwrap();
    assert!(!mem.is_locked(URL));
}

#[tokio::test]
async fn resumed_session_checks_in() {
    let (mem, coordinator, root) = setup(Recorder::default());

    let session = checkout(&coordinator).await;
    let path = session.working_copy().unwrap().file().to_path_buf();
    let token = session.lock_token().unwrap().clone();
    drop(session);

    std::fs::write(&path, b"from another process").unwrap();
    let session = CheckoutSession::resume(doc(), &path, token).unwrap();
    coordinator.checkin(session).await.unwrap();

    assert_eq!(mem.contents(URL).unwrap(), &b"from another process"[..]);
    assert!(!mem.is_locked(URL));
    assert!(is_empty_dir(&root));
}

#[tokio::test]
async fn url_without_file_name_sends_nothing() {
    let (mem, coordinator, root) = setup(Recorder::default());

    let dir = DocumentRef::parse("http://host/silverpeas/repository/doc lib/").unwrap();
    let err = coordinator
        .checkout(dir, "alice", &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::InvalidUrl(_)));
    assert!(mem.calls().is_empty());
    assert!(mem.contents("http://host/silverpeas/repository/doc lib/").is_none());
    assert!(is_empty_dir(&root));
}

#[tokio::test]
async fn short_body_fails_and_releases_lock() {
    let (mem, coordinator, root) = setup(Recorder::default());
    mem.set_chunk_size(4);
    mem.truncate_next_get(10);

    let err = coordinator
        .checkout(doc(), "alice", &CancelToken::never())
        .await
        .unwrap_err();
    match err {
        DavError::Transport(TransportError::Io(e)) => {
            assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
            assert!(e.to_string().contains(&format!("expected {} bytes, received 10", CONTENT.len())));
        }
        other => panic!("unexpected {other:?}"),
    }
    let methods: Vec<_> = mem.calls().into_iter().map(|(m, _)| m).collect();
    assert_eq!(methods, vec![DavMethod::LOCK, DavMethod::GET, DavMethod::UNLOCK]);
    assert!(!mem.is_locked(URL));
    assert!(is_empty_dir(&root));
}

#[tokio::test]
async fn failed_existence_check_uploads_nothing() {
    let (mem, coordinator, _root) = setup(Recorder::default());

    let session = checkout(&coordinator).await;
    mem.fail_next(DavMethod::HEAD, StatusCode::INTERNAL_SERVER_ERROR);

    let err = coordinator.checkin(session).await.unwrap_err();
    assert_eq!(err.severity(), Severity::DataAtRisk);
    assert!(matches!(err.error(), DavError::RemoteStoreFailed { status, .. } if *status == StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(mem.count(DavMethod::PUT), 0);
    assert_eq!(mem.count(DavMethod::UNLOCK), 0);
    assert!(mem.is_locked(URL));

    let session = err.into_session().unwrap();
    assert!(session.working_copy().unwrap().file().exists());
    coordinator.checkin(session).await.unwrap();
}

#[tokio::test]
async fn lock_without_token_fails() {
    let (mem, coordinator, root) = setup(Recorder::default());
    // a success status, but no token in the answer.
    mem.fail_next(DavMethod::LOCK, StatusCode::OK);

    let err = coordinator
        .checkout(doc(), "alice", &CancelToken::never())
        .await
        .unwrap_err();
    match err {
        DavError::LockFailed { status, reason } => {
            assert_eq!(status, StatusCode::OK);
            assert_eq!(reason, "no lock token in response");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(mem.methods_used(), DavMethod::LOCK);
    assert!(is_empty_dir(&root));
}
