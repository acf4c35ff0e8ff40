//! Backend built on the `notify` crate.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use notify::{Config, ErrorKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};

use crate::backend::mounts;
use crate::backend::translate::{Change, Translator};
use crate::backend::{Backend, Trampoline};
use crate::error::{set_last_error, WatchError, WatchId};
use crate::event::RawEvent;
use crate::flags::{ModifiedSources, NotifyFilter};
use crate::options::{option_kind, RawOption};
use crate::utils::split_path;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Flavour {
    Native,
    Polling(Duration),
}

enum AnyWatcher {
    Recommended(RecommendedWatcher),
    Polling(PollWatcher),
}

impl AnyWatcher {
    fn watch(&mut self, path: &Path, mode: RecursiveMode) -> notify::Result<()> {
        match self {
            Self::Recommended(watcher) => watcher.watch(path, mode),
            Self::Polling(watcher) => watcher.watch(path, mode),
        }
    }
}

struct ActiveWatch {
    directory: PathBuf,
    _watcher: AnyWatcher,
}

/// One `notify` watcher per watch, either the platform's recommended one or a `PollWatcher`.
///
/// Each watch has a translator thread fed by the watcher. Events reach trampolines on that
/// thread, in the order the watcher reports them.
pub struct NotifyBackend {
    flavour: Flavour,
    follow_symlinks: bool,
    started: Arc<AtomicBool>,
    next_id: i64,
    watches: HashMap<WatchId, ActiveWatch>,
}

impl NotifyBackend {
    /// inotify, kqueue, FSEvents or `ReadDirectoryChangesW`, depending on the platform.
    pub fn native() -> Self {
        Self::new(Flavour::Native)
    }

    /// Portable polling, rescanning every `interval`.
    pub fn polling(interval: Duration) -> Self {
        Self::new(Flavour::Polling(interval))
    }

    fn new(flavour: Flavour) -> Self {
        Self {
            flavour,
            follow_symlinks: false,
            started: Arc::new(AtomicBool::new(false)),
            next_id: 1,
            watches: HashMap::new(),
        }
    }

    fn try_add_watch(
        &mut self,
        path: &Path,
        recursive: bool,
        options: &[RawOption],
        trampoline: Trampoline,
    ) -> Result<WatchId, WatchError> {
        let meta = fs::symlink_metadata(path)
            .map_err(|e| fail(io_error_kind(&e), format!("{}: {}", path.display(), e)))?;
        if meta.file_type().is_symlink() && !self.follow_symlinks {
            return Err(fail(
                WatchError::OutOfScope,
                format!("{} is a symlink and symlinks are not followed", path.display()),
            ));
        }
        let directory = fs::canonicalize(path)
            .map_err(|e| fail(io_error_kind(&e), format!("{}: {}", path.display(), e)))?;
        if !directory.is_dir() {
            return Err(fail(
                WatchError::NotFound,
                format!("{} is not a directory", directory.display()),
            ));
        }
        if let Err(e) = fs::read_dir(&directory) {
            return Err(fail(
                io_error_kind(&e),
                format!("{}: {}", directory.display(), e),
            ));
        }
        if self.watches.values().any(|w| w.directory == directory) {
            return Err(fail(
                WatchError::Repeated,
                format!("{} is already watched", directory.display()),
            ));
        }
        if self.flavour == Flavour::Native && mounts::is_remote(&directory) {
            return Err(fail(
                WatchError::Remote,
                format!("{} is on a remote filesystem", directory.display()),
            ));
        }

        let id = WatchId::new(self.next_id);
        let translator = Translator::new(modified_sources(options));
        let (event_tx, event_rx) = channel();
        thread::Builder::new()
            .name(format!("dirwatch-{}", id.get()))
            .spawn(move || run_translator(id, translator, &event_rx, &trampoline))
            .map_err(|e| fail(WatchError::WatchFailed, e.to_string()))?;

        let started = self.started.clone();
        // Dropping the watcher drops the sender, which ends the translator thread.
        let handler = move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if !started.load(Ordering::Acquire) {
                    return;
                }
                debug!("Watch {} received {:?}", id, event.kind);
                if event_tx.send(event).is_err() {
                    debug!("Watch {} translator is gone", id);
                }
            }
            Err(e) => {
                error!("Watch {} backend error: {}", id, e);
                set_last_error(e.to_string());
            }
        };

        let config = Config::default().with_follow_symlinks(self.follow_symlinks);
        let watcher = match self.flavour {
            Flavour::Native => {
                RecommendedWatcher::new(handler, config).map(AnyWatcher::Recommended)
            }
            Flavour::Polling(interval) => {
                PollWatcher::new(handler, config.with_poll_interval(interval))
                    .map(AnyWatcher::Polling)
            }
        };
        let mut watcher = watcher.map_err(|e| fail(WatchError::WatchFailed, e.to_string()))?;
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&directory, mode)
            .map_err(|e| fail(notify_error_kind(&e), e.to_string()))?;

        self.next_id += 1;
        self.watches.insert(
            id,
            ActiveWatch {
                directory,
                _watcher: watcher,
            },
        );
        Ok(id)
    }
}

impl Backend for NotifyBackend {
    fn add_watch(
        &mut self,
        path: &Path,
        recursive: bool,
        options: &[RawOption],
        trampoline: Trampoline,
    ) -> i64 {
        match self.try_add_watch(path, recursive, options, trampoline) {
            Ok(id) => id.get(),
            Err(e) => e.code(),
        }
    }

    fn remove_watch(&mut self, id: WatchId) {
        if let Some(watch) = self.watches.remove(&id) {
            debug!("Stopped watch {} on {:?}", id, watch.directory);
        }
    }

    fn remove_watch_path(&mut self, path: &Path) {
        let directory = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let id = self
            .watches
            .iter()
            .find(|(_, w)| w.directory == directory)
            .map(|(id, _)| *id);
        if let Some(id) = id {
            self.remove_watch(id);
        }
    }

    fn start(&mut self) {
        self.started.store(true, Ordering::Release);
    }

    fn set_follow_symlinks(&mut self, follow: bool) {
        self.follow_symlinks = follow;
    }

    fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }
}

/// Translate events for one watch until its watcher is dropped, flushing unclaimed rename halves
/// once their window passes.
fn run_translator(
    id: WatchId,
    mut translator: Translator,
    events: &Receiver<notify::Event>,
    trampoline: &Trampoline,
) {
    loop {
        let next = match translator.deadline() {
            Some(deadline) => {
                events.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => events.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let changes = match next {
            Ok(event) => translator.translate(&event),
            Err(RecvTimeoutError::Timeout) => translator.expire(Instant::now()),
            Err(RecvTimeoutError::Disconnected) => break,
        };
        for change in changes {
            deliver(trampoline, id, &change);
        }
    }
    debug!("Watch {} translator stopped", id);
}

fn deliver(trampoline: &Trampoline, watch_id: WatchId, change: &Change) {
    let Some((directory, basename)) = split_path(&change.path) else {
        warn!("Watch {} dropped change without a file name: {:?}", watch_id, change.path);
        return;
    };
    trampoline(RawEvent {
        watch_id,
        directory,
        basename,
        action: change.action,
        old_basename: change.old_path.as_deref().and_then(Path::file_name),
    });
}

/// Which modification sources this platform honours from `options`.
fn modified_sources(options: &[RawOption]) -> ModifiedSources {
    let mut sources = ModifiedSources::all();
    for option in options {
        let bits = u32::try_from(option.value).unwrap_or_default();
        match option.kind {
            option_kind::MAC_MODIFIED_FILTER if cfg!(target_os = "macos") => {
                sources &= ModifiedSources::from_bits_truncate(bits);
            }
            option_kind::WINDOWS_NOTIFY_FILTER if cfg!(windows) => {
                sources &= NotifyFilter::from_bits_truncate(bits).modified_sources();
            }
            kind => warn!("Ignoring option {} ({}) on this platform", kind, option.value),
        }
    }
    sources
}

fn fail(kind: WatchError, message: String) -> WatchError {
    debug!("Unable to add watch: {}", message);
    set_last_error(message);
    kind
}

fn io_error_kind(e: &io::Error) -> WatchError {
    match e.kind() {
        io::ErrorKind::NotFound => WatchError::NotFound,
        io::ErrorKind::PermissionDenied => WatchError::NotReadable,
        _ => WatchError::Unspecified,
    }
}

fn notify_error_kind(e: &notify::Error) -> WatchError {
    match &e.kind {
        ErrorKind::PathNotFound | ErrorKind::WatchNotFound => WatchError::NotFound,
        ErrorKind::Io(io) if io.kind() == io::ErrorKind::PermissionDenied => {
            WatchError::NotReadable
        }
        ErrorKind::Generic(_) => WatchError::Unspecified,
        _ => WatchError::WatchFailed,
    }
}
