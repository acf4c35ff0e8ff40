#![allow(clippy::significant_drop_tightening)]

use std::collections::{HashMap, VecDeque};
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;
use tempfile::tempdir;

use crate::backend::{Backend, Trampoline};
use crate::error::{status, WatchError, WatchId};
use crate::event::{action, Action, RawEvent, WatchEvent};
use crate::options::{RawOption, WatchOptions};
use crate::session::Session;

static TEST_PARALLEL_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serialize tests that touch process-wide state such as the last error message.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    TEST_PARALLEL_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(500);
// Lets the backend observe each step on its own.
const STEP: Duration = Duration::from_millis(200);

#[derive(Default)]
struct MockState {
    script: VecDeque<i64>,
    next_id: i64,
    added: Vec<PathBuf>,
    removed: Vec<WatchId>,
    trampolines: HashMap<WatchId, Trampoline>,
    started: bool,
    follow: bool,
}

/// Backend whose `add_watch` results are scripted, and whose events are fired by hand.
#[derive(Clone, Default)]
struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("not poisoned")
    }

    /// Make the next `add_watch` return `code`.
    fn fail_next(&self, code: i64) {
        self.state().script.push_back(code);
    }

    fn trampoline(&self, id: WatchId) -> Trampoline {
        self.state()
            .trampolines
            .get(&id)
            .cloned()
            .expect("watch to be active")
    }

    fn fire(trampoline: &Trampoline, id: WatchId, code: u32, name: &str) {
        trampoline(RawEvent {
            watch_id: id,
            directory: Path::new("/mock"),
            basename: OsStr::new(name),
            action: code,
            old_basename: None,
        });
    }
}

impl Backend for MockBackend {
    fn add_watch(
        &mut self,
        path: &Path,
        _recursive: bool,
        _options: &[RawOption],
        trampoline: Trampoline,
    ) -> i64 {
        let mut state = self.state();
        state.added.push(path.to_path_buf());
        if let Some(code) = state.script.pop_front() {
            return code;
        }
        let id = state.next_id;
        state.next_id += 1;
        state
            .trampolines
            .insert(WatchError::from_code(id).expect("valid id"), trampoline);
        id
    }

    fn remove_watch(&mut self, id: WatchId) {
        let mut state = self.state();
        if state.trampolines.remove(&id).is_some() {
            state.removed.push(id);
        }
    }

    fn remove_watch_path(&mut self, _path: &Path) {
        unreachable!("sessions remove watches by id")
    }

    fn start(&mut self) {
        self.state().started = true;
    }

    fn set_follow_symlinks(&mut self, follow: bool) {
        self.state().follow = follow;
    }

    fn follow_symlinks(&self) -> bool {
        self.state().follow
    }
}

fn mock_session() -> (Session, MockBackend) {
    let backend = MockBackend::default();
    (Session::with_backend(Box::new(backend.clone())), backend)
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct Seen {
    action: Action,
    directory: PathBuf,
    name: OsString,
    old_name: Option<OsString>,
}

impl Seen {
    fn new(action: Action, directory: &Path, name: &str) -> Self {
        Self {
            action,
            directory: directory.to_path_buf(),
            name: OsString::from(name),
            old_name: None,
        }
    }
}

fn record(tx: &Sender<Seen>) -> impl Fn(&WatchEvent<'_>) -> anyhow::Result<()> + Send + Sync {
    let tx = tx.clone();
    move |ev| {
        tx.send(Seen {
            action: ev.action,
            directory: ev.directory.to_path_buf(),
            name: ev.basename.to_os_string(),
            old_name: ev.old_basename.map(OsStr::to_os_string),
        })?;
        Ok(())
    }
}

/// Receive every event until `last` shows up.
fn collect_until(rx: &Receiver<Seen>, last: &Seen) -> Vec<Seen> {
    let mut seen: Vec<Seen> = Vec::new();
    loop {
        let ev = rx.recv_timeout(TIMEOUT).unwrap_or_else(|_| {
            panic!("timed out waiting for {:?}, got {:?}", last, seen)
        });
        let done = &ev == last;
        seen.push(ev);
        if done {
            return seen;
        }
    }
}

/// Like [`collect_until`], then keep receiving until nothing arrives for a while.
fn collect_settled(rx: &Receiver<Seen>, last: &Seen) -> Vec<Seen> {
    let mut seen = collect_until(rx, last);
    seen.extend(std::iter::from_fn(|| rx.recv_timeout(QUIET).ok()));
    seen
}

#[test]
fn must_session_be_send() {
    fn check_send<T: Send>() {}
    check_send::<Session>();
}

#[test]
fn must_reject_repeated_path_before_backend() {
    let (mut session, backend) = mock_session();
    let id = session
        .add_watch("/mock/a", WatchOptions::new())
        .expect("to be added");

    assert_eq!(
        session.add_watch("/mock/a", WatchOptions::new()),
        Err(WatchError::Repeated)
    );
    assert_eq!(backend.state().added.len(), 1);
    assert_eq!(session.watch_id("/mock/a"), Some(id));
    assert_eq!(session.directory(id), Some(Path::new("/mock/a")));
}

#[test]
fn must_leave_nothing_registered_on_backend_failure() {
    let (mut session, backend) = mock_session();
    for (code, expected) in [
        (status::NOT_FOUND, WatchError::NotFound),
        (status::REMOTE, WatchError::Remote),
        (-42, WatchError::Unexpected(-42)),
    ] {
        backend.fail_next(code);
        assert_eq!(session.add_watch("/mock/a", WatchOptions::new()), Err(expected));
        assert!(session.is_empty());
        assert_eq!(session.watch_id("/mock/a"), None);
    }

    // The path can still be watched once the backend cooperates.
    assert!(session.add_watch("/mock/a", WatchOptions::new()).is_ok());
    assert_eq!(session.len(), 1);
}

#[test]
fn must_route_events_to_matching_callbacks() {
    let (mut session, backend) = mock_session();
    let (tx, rx) = channel();
    let id = session
        .add_watch(
            "/mock/a",
            WatchOptions::new()
                .on_add(record(&tx))
                .on_delete(record(&tx)),
        )
        .expect("to be added");
    session.start();
    assert!(backend.state().started);

    let trampoline = backend.trampoline(id);
    MockBackend::fire(&trampoline, id, action::ADD, "x");
    MockBackend::fire(&trampoline, id, action::MODIFIED, "x");
    MockBackend::fire(&trampoline, id, 99, "x");
    MockBackend::fire(&trampoline, id, action::DELETE, "x");

    let dir = Path::new("/mock");
    assert_eq!(rx.try_recv().ok(), Some(Seen::new(Action::Add, dir, "x")));
    assert_eq!(rx.try_recv().ok(), Some(Seen::new(Action::Delete, dir, "x")));
    assert!(rx.try_recv().is_err());
}

#[test]
fn must_not_deliver_after_removal() {
    let (mut session, backend) = mock_session();
    let (tx, rx) = channel();
    let id = session
        .add_watch("/mock/a", WatchOptions::new().on_any(record(&tx)))
        .expect("to be added");
    session.start();

    // The backend may still hold a queued event when the watch goes away.
    let pending = backend.trampoline(id);
    session.remove_watch(id);
    MockBackend::fire(&pending, id, action::ADD, "late");

    assert!(rx.try_recv().is_err());
    assert_eq!(backend.state().removed, vec![id]);
    assert!(session.is_empty());
    assert_eq!(session.watch_id("/mock/a"), None);
}

#[test]
fn must_wait_for_running_callback_on_removal() {
    let (mut session, backend) = mock_session();
    let (entered_tx, entered_rx) = channel();
    let finished = Arc::new(AtomicBool::new(false));
    let finished_cb = finished.clone();
    let id = session
        .add_watch(
            "/mock/a",
            WatchOptions::new().on_add(move |_| {
                entered_tx.send(())?;
                thread::sleep(Duration::from_millis(200));
                finished_cb.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .expect("to be added");
    session.start();

    let trampoline = backend.trampoline(id);
    let firing = thread::spawn(move || MockBackend::fire(&trampoline, id, action::ADD, "x"));
    entered_rx.recv_timeout(TIMEOUT).expect("callback to start");
    session.remove_watch(id);
    assert!(finished.load(Ordering::SeqCst));
    firing.join().expect("to join");
}

#[test]
fn must_ignore_unknown_removals() {
    let (mut session, backend) = mock_session();
    let id = session
        .add_watch("/mock/a", WatchOptions::new())
        .expect("to be added");

    session.remove_watch(WatchId::new(id.get() + 100));
    session.remove_watch_path("/mock/unknown");
    assert_eq!(session.len(), 1);
    assert!(backend.state().removed.is_empty());

    session.remove_watch_path("/mock/a");
    assert!(session.is_empty());
    assert_eq!(backend.state().removed, vec![id]);
}

#[test]
fn must_remove_everything_on_drop() {
    let (mut session, backend) = mock_session();
    let a = session
        .add_watch("/mock/a", WatchOptions::new())
        .expect("to be added");
    let b = session
        .add_watch("/mock/b", WatchOptions::new())
        .expect("to be added");
    let mut ids = session.watch_ids();
    ids.sort_by_key(|id| id.get());
    assert_eq!(ids, vec![a, b]);

    drop(session);
    let state = backend.state();
    assert!(state.trampolines.is_empty());
    assert_eq!(state.removed.len(), 2);
}

#[test]
fn must_refuse_identifier_still_in_use() {
    let (mut session, backend) = mock_session();
    let (tx, rx) = channel();
    let id = session
        .add_watch("/mock/a", WatchOptions::new().on_add(record(&tx)))
        .expect("to be added");

    backend.fail_next(id.get());
    assert_eq!(
        session.add_watch("/mock/b", WatchOptions::new()),
        Err(WatchError::Unexpected(id.get()))
    );
    assert_eq!(session.len(), 1);
    assert_eq!(session.watch_id("/mock/b"), None);
    assert_eq!(session.directory(id), Some(Path::new("/mock/a")));

    // The existing watch keeps its callbacks.
    session.start();
    MockBackend::fire(&backend.trampoline(id), id, action::ADD, "x");
    assert_eq!(
        rx.try_recv().ok(),
        Some(Seen::new(Action::Add, Path::new("/mock"), "x"))
    );
}

#[test]
fn must_forward_symlink_setting() {
    let (mut session, backend) = mock_session();
    assert!(!session.follow_symlinks());
    session.set_follow_symlinks(true);
    assert!(session.follow_symlinks());
    assert!(backend.state().follow);
}

#[test]
fn must_start_once() {
    let (mut session, _backend) = mock_session();
    assert!(!session.is_started());
    session.start();
    session.start();
    assert!(session.is_started());
}

#[test]
fn must_receive_add_modify_delete_in_order() {
    let _guard = serial();
    let dir = tempdir().expect("to be created");
    let root = dir.path().canonicalize().expect("to succeed");
    let (tx, rx) = channel();

    let mut session = Session::new(false);
    session
        .add_watch(&root, WatchOptions::new().on_any(record(&tx)))
        .expect("to be added");
    session.start();

    let file = root.join("new_file");
    drop(File::create(&file).expect("to be created"));
    thread::sleep(STEP);
    let mut appending = OpenOptions::new()
        .append(true)
        .open(&file)
        .expect("to be opened");
    appending.write_all(b"hello").expect("to be written");
    drop(appending);
    thread::sleep(STEP);
    fs::remove_file(&file).expect("to be removed");

    let seen = collect_settled(&rx, &Seen::new(Action::Delete, &root, "new_file"));
    assert_eq!(
        seen,
        vec![
            Seen::new(Action::Add, &root, "new_file"),
            Seen::new(Action::Modified, &root, "new_file"),
            Seen::new(Action::Delete, &root, "new_file"),
        ]
    );
}

#[test]
fn must_receive_rename_with_both_names() {
    let _guard = serial();
    let dir = tempdir().expect("to be created");
    let root = dir.path().canonicalize().expect("to succeed");
    let (tx, rx) = channel();

    let mut session = Session::new(false);
    session
        .add_watch(
            &root,
            WatchOptions::new()
                .on_add(record(&tx))
                .on_renamed(record(&tx))
                .on_delete(record(&tx)),
        )
        .expect("to be added");
    session.start();

    fs::write(root.join("new_file"), b"").expect("to be written");
    thread::sleep(STEP);
    fs::rename(root.join("new_file"), root.join("renamed_file")).expect("to be renamed");
    thread::sleep(STEP);
    fs::remove_file(root.join("renamed_file")).expect("to be removed");

    let renamed = Seen {
        old_name: Some(OsString::from("new_file")),
        ..Seen::new(Action::Renamed, &root, "renamed_file")
    };
    let seen = collect_settled(&rx, &Seen::new(Action::Delete, &root, "renamed_file"));
    assert_eq!(
        seen,
        vec![
            Seen::new(Action::Add, &root, "new_file"),
            renamed,
            Seen::new(Action::Delete, &root, "renamed_file"),
        ]
    );
}

#[test]
fn must_report_move_out_without_further_activity() {
    let _guard = serial();
    let dir = tempdir().expect("to be created");
    let base = dir.path().canonicalize().expect("to succeed");
    let root = base.join("watched");
    let outside = base.join("outside");
    fs::create_dir(&root).expect("to be created");
    fs::create_dir(&outside).expect("to be created");
    fs::write(root.join("leaving"), b"").expect("to be written");
    let (tx, rx) = channel();

    let mut session = Session::new(false);
    session
        .add_watch(&root, WatchOptions::new().on_any(record(&tx)))
        .expect("to be added");
    session.start();

    fs::rename(root.join("leaving"), outside.join("leaving")).expect("to be moved");

    let seen = collect_settled(&rx, &Seen::new(Action::Delete, &root, "leaving"));
    assert_eq!(seen, vec![Seen::new(Action::Delete, &root, "leaving")]);
}

#[test]
fn must_watch_subdirectories_recursively() {
    let _guard = serial();
    let dir = tempdir().expect("to be created");
    let root = dir.path().canonicalize().expect("to succeed");
    let (tx, rx) = channel();

    let mut session = Session::new(false);
    session
        .add_watch(&root, WatchOptions::new().recursive(true).on_add(record(&tx)))
        .expect("to be added");
    session.start();

    let sub = root.join("sub");
    fs::create_dir(&sub).expect("to be created");
    collect_until(&rx, &Seen::new(Action::Add, &root, "sub"));
    // Give the backend time to pick up the new directory.
    thread::sleep(Duration::from_millis(500));
    fs::write(sub.join("nested"), b"").expect("to be written");
    collect_until(&rx, &Seen::new(Action::Add, &sub, "nested"));
}

#[test]
fn must_discard_changes_before_start() {
    let _guard = serial();
    let dir = tempdir().expect("to be created");
    let root = dir.path().canonicalize().expect("to succeed");
    let (tx, rx) = channel();

    let mut session = Session::new(false);
    session
        .add_watch(&root, WatchOptions::new().on_add(record(&tx)))
        .expect("to be added");

    fs::write(root.join("early"), b"").expect("to be written");
    thread::sleep(Duration::from_millis(300));
    session.start();
    fs::write(root.join("late"), b"").expect("to be written");

    let seen = collect_until(&rx, &Seen::new(Action::Add, &root, "late"));
    assert_eq!(seen, vec![Seen::new(Action::Add, &root, "late")]);
}

#[test]
fn must_poll_with_generic_backend() {
    let _guard = serial();
    let dir = tempdir().expect("to be created");
    let root = dir.path().canonicalize().expect("to succeed");
    let (tx, rx) = channel();

    let mut session = Session::with_config(
        &crate::SessionConfig::default()
            .with_generic_backend(true)
            .with_poll_interval(Duration::from_millis(50)),
    );
    session
        .add_watch(&root, WatchOptions::new().on_add(record(&tx)))
        .expect("to be added");
    session.start();

    fs::write(root.join("polled"), b"").expect("to be written");
    collect_until(&rx, &Seen::new(Action::Add, &root, "polled"));
}

#[test]
fn must_recover_failing_callback_through_error_callback() {
    let _guard = serial();
    let dir = tempdir().expect("to be created");
    let root = dir.path().canonicalize().expect("to succeed");
    let (tx, rx) = channel();

    let mut session = Session::new(false);
    let id = session
        .add_watch(
            &root,
            WatchOptions::new()
                .on_add(|ev| Err(anyhow::anyhow!("refusing {:?}", ev.basename)))
                .on_error(move |failure| {
                    tx.send((failure.watch_id, failure.action, failure.error.to_string()))?;
                    Ok(())
                }),
        )
        .expect("to be added");
    session.start();

    fs::write(root.join("doomed"), b"").expect("to be written");
    let (watch_id, failed, message) = rx.recv_timeout(TIMEOUT).expect("failure to be reported");
    assert_eq!(watch_id, id);
    assert_eq!(failed, Action::Add);
    assert_eq!(message, "refusing \"doomed\"");
}

#[cfg(feature = "tokio")]
mod streams {
    use std::ffi::OsStr;
    use std::fs;

    use futures_util::StreamExt;
    use tempfile::tempdir;
    use tokio1 as tokio;
    use tokio::time::timeout;

    use crate::event::Action;
    use crate::session::Session;

    use super::{serial, TIMEOUT};

    #[tokio::test]
    #[allow(clippy::await_holding_lock)]
    async fn must_stream_notifications_until_removed() {
        let _guard = serial();
        let dir = tempdir().expect("to be created");
        let root = dir.path().canonicalize().expect("to succeed");

        let mut session = Session::new(false);
        let (id, mut stream) = session
            .add_watch_stream(&root, false)
            .expect("to be added");
        session.start();

        fs::write(root.join("streamed"), b"").expect("to be written");
        let first = timeout(TIMEOUT, stream.next())
            .await
            .expect("to arrive")
            .expect("stream to be open");
        assert_eq!(first.watch_id(), id);
        assert_eq!(first.action(), Action::Add);
        assert_eq!(first.directory(), Some(root.as_path()));
        assert_eq!(first.name(), Some(OsStr::new("streamed")));

        session.remove_watch(id);
        let rest: Vec<_> = timeout(TIMEOUT, stream.collect())
            .await
            .expect("stream to end");
        assert!(rest.iter().all(|n| !n.is_error()));
    }
}
