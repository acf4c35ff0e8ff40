use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use crate::event::Action;
use crate::options::{ErrorCallback, EventCallback, UserData, WatchOptions};

/// Everything a session keeps for one active watch.
///
/// Shared between the session and the backend trampoline through an `Arc`, so it outlives any
/// callback that is running for it. The delivery gate decides whether new callbacks may start.
pub struct WatchContext {
    directory: PathBuf,
    on_add: Option<EventCallback>,
    on_delete: Option<EventCallback>,
    on_modified: Option<EventCallback>,
    on_renamed: Option<EventCallback>,
    on_error: Option<ErrorCallback>,
    user_data: Option<UserData>,
    gate: RwLock<bool>,
}

/// Proof that the watch was open when delivery started. Removal waits for it to be dropped.
pub(crate) struct Delivery<'a> {
    _guard: RwLockReadGuard<'a, bool>,
}

impl WatchContext {
    pub(crate) fn new(directory: PathBuf, options: WatchOptions) -> Self {
        Self {
            directory,
            on_add: options.on_add,
            on_delete: options.on_delete,
            on_modified: options.on_modified,
            on_renamed: options.on_renamed,
            on_error: options.on_error,
            user_data: options.user_data,
            gate: RwLock::new(true),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    pub fn callback(&self, action: Action) -> Option<&EventCallback> {
        match action {
            Action::Add => self.on_add.as_ref(),
            Action::Delete => self.on_delete.as_ref(),
            Action::Modified => self.on_modified.as_ref(),
            Action::Renamed => self.on_renamed.as_ref(),
        }
    }

    pub fn error_callback(&self) -> Option<&ErrorCallback> {
        self.on_error.as_ref()
    }

    /// Enter a delivery. Returns `None` once the watch has been closed.
    pub(crate) fn begin_delivery(&self) -> Option<Delivery<'_>> {
        let guard = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        if *guard {
            Some(Delivery { _guard: guard })
        } else {
            None
        }
    }

    /// Close the gate, waiting for deliveries in progress to finish.
    ///
    /// Must not be called from inside one of this context's callbacks.
    pub(crate) fn close(&self) {
        *self.gate.write().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_open(&self) -> bool {
        *self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for WatchContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchContext")
            .field("directory", &self.directory)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
