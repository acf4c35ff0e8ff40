//! Watch sessions: the public surface for registering directories.
#![allow(clippy::module_name_repetitions)]

use std::fmt::{Debug, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::backend::{create_backend, Backend, Trampoline};
use crate::context::WatchContext;
use crate::dispatch::EventDispatcher;
use crate::error::{WatchError, WatchId};
use crate::event::RawEvent;
use crate::options::WatchOptions;
use crate::registry::WatchRegistry;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Names the session an event was delivered for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for SessionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// How a session is created.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionConfig {
    /// Use the portable polling backend instead of the platform's native one.
    pub use_generic_backend: bool,
    /// Scan interval of the polling backend.
    pub poll_interval: Duration,
    pub follow_symlinks: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_generic_backend: false,
            poll_interval: Duration::from_millis(500),
            follow_symlinks: false,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_generic_backend(mut self, use_generic_backend: bool) -> Self {
        self.use_generic_backend = use_generic_backend;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn with_follow_symlinks(mut self, follow_symlinks: bool) -> Self {
        self.follow_symlinks = follow_symlinks;
        self
    }
}

/// A set of directory watches sharing one backend.
///
/// Registration methods take `&mut self` and run on the caller's thread. Events are delivered on
/// backend threads once [`start`](Session::start) has been called; see
/// [`WatchOptions`](crate::WatchOptions) for what callbacks may do there.
///
/// Dropping the session removes every remaining watch, then releases the backend and the watch
/// contexts.
pub struct Session {
    handle: SessionHandle,
    backend: Box<dyn Backend>,
    registry: WatchRegistry,
    dispatcher: EventDispatcher,
    started: bool,
}

impl Session {
    /// Create a session on the native backend, or on the polling one if `use_generic_backend`.
    pub fn new(use_generic_backend: bool) -> Self {
        Self::with_config(&SessionConfig::default().with_generic_backend(use_generic_backend))
    }

    pub fn with_config(config: &SessionConfig) -> Self {
        let mut backend = create_backend(config.use_generic_backend, config.poll_interval);
        backend.set_follow_symlinks(config.follow_symlinks);
        Self::with_backend(backend)
    }

    /// Create a session on a caller-provided backend.
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        let handle = SessionHandle::next();
        debug!("Created {}", handle);
        Self {
            handle,
            backend,
            registry: WatchRegistry::new(),
            dispatcher: EventDispatcher::new(handle),
            started: false,
        }
    }

    pub const fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Watch `path`.
    ///
    /// # Errors
    /// Return [`WatchError::Repeated`] when `path` is already watched by this session, before the
    /// backend is consulted. Other errors come from the backend, and leave nothing registered;
    /// an identifier that still names another watch is reported as [`WatchError::Unexpected`].
    pub fn add_watch(
        &mut self,
        path: impl AsRef<Path>,
        options: WatchOptions,
    ) -> Result<WatchId, WatchError> {
        let path = path.as_ref();
        let directory = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.registry.contains_path(&directory) {
            return Err(WatchError::Repeated);
        }

        let recursive = options.recursive;
        let raw_options = options.platform.to_raw();
        let context = Arc::new(WatchContext::new(directory, options));

        let handle = Arc::downgrade(&context);
        let dispatcher = self.dispatcher;
        let trampoline: Trampoline = Arc::new(move |raw: RawEvent<'_>| {
            dispatcher.dispatch(handle.upgrade().as_deref(), &raw);
        });

        let id = WatchError::from_code(self.backend.add_watch(
            path,
            recursive,
            &raw_options,
            trampoline,
        ))?;
        if let Err(e) = self.registry.insert(id, context) {
            warn!("{}: backend issued {} which is still active", self.handle, id);
            return Err(e);
        }
        debug!(
            "{}: watching {:?} as {} (recursive: {})",
            self.handle, path, id, recursive
        );
        Ok(id)
    }

    /// Stop watching `id`. Unknown identifiers are ignored.
    ///
    /// Once this returns no callback for `id` is running or will start, including for events the
    /// backend had already queued.
    ///
    /// Must not be called from inside a callback of the same watch.
    pub fn remove_watch(&mut self, id: WatchId) {
        if let Some(context) = self.registry.remove(id) {
            context.close();
            self.backend.remove_watch(id);
            debug!(
                "{}: removed {} for {:?}",
                self.handle,
                id,
                context.directory()
            );
        }
    }

    /// Stop watching `path`, if it is watched.
    pub fn remove_watch_path(&mut self, path: impl AsRef<Path>) {
        if let Some(id) = self.watch_id(path) {
            self.remove_watch(id);
        }
    }

    /// Begin delivering events for current and future watches.
    ///
    /// Returns immediately; backends deliver from their own threads until the watch is removed
    /// or the session dropped. Calling it again has no effect.
    pub fn start(&mut self) {
        if !self.started {
            self.backend.start();
            self.started = true;
            debug!("{}: started", self.handle);
        }
    }

    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Whether recursive watches traverse symbolic links. Applies to watches added afterwards.
    pub fn set_follow_symlinks(&mut self, follow: bool) {
        self.backend.set_follow_symlinks(follow);
    }

    pub fn follow_symlinks(&self) -> bool {
        self.backend.follow_symlinks()
    }

    pub fn watch_id(&self, path: impl AsRef<Path>) -> Option<WatchId> {
        let path = path.as_ref();
        self.registry.id_of(path).or_else(|| {
            fs::canonicalize(path)
                .ok()
                .and_then(|directory| self.registry.id_of(&directory))
        })
    }

    /// Directory watched by `id`.
    pub fn directory(&self, id: WatchId) -> Option<&Path> {
        self.registry.get(id).map(|context| context.directory())
    }

    pub fn watch_ids(&self) -> Vec<WatchId> {
        self.registry.ids().collect()
    }

    /// Directories currently watched.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.registry.paths().map(Path::to_path_buf).collect()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("registry", &self.registry)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let ids: Vec<_> = self.registry.ids().collect();
        for id in ids {
            if let Some(context) = self.registry.get(id) {
                context.close();
            }
            self.backend.remove_watch(id);
        }
        debug!("Dropped {}", self.handle);
        // Fields drop in declaration order: the backend goes before the registry's contexts.
    }
}
