use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::WatchContext;
use crate::error::{WatchError, WatchId};

/// Path ↔ identifier ↔ context mapping of a session.
///
/// Both maps are updated together: a path is registered exactly when its identifier is, and each
/// registered path owns exactly one context.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    by_path: HashMap<PathBuf, WatchId>,
    by_id: HashMap<WatchId, Arc<WatchContext>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn id_of(&self, path: &Path) -> Option<WatchId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: WatchId) -> Option<&Arc<WatchContext>> {
        self.by_id.get(&id)
    }

    /// Register a context under `id`, keyed by its directory.
    ///
    /// # Errors
    /// Return [`WatchError::Repeated`] when the directory is already registered, and
    /// [`WatchError::Unexpected`] when `id` still names another watch. Nothing changes then.
    pub fn insert(&mut self, id: WatchId, context: Arc<WatchContext>) -> Result<(), WatchError> {
        let path = context.directory();
        if self.by_path.contains_key(path) {
            return Err(WatchError::Repeated);
        }
        if self.by_id.contains_key(&id) {
            return Err(WatchError::Unexpected(id.get()));
        }
        self.by_path.insert(path.to_path_buf(), id);
        self.by_id.insert(id, context);
        Ok(())
    }

    pub fn remove(&mut self, id: WatchId) -> Option<Arc<WatchContext>> {
        let context = self.by_id.remove(&id)?;
        self.by_path.remove(context.directory());
        Some(context)
    }

    pub fn ids(&self) -> impl Iterator<Item = WatchId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.by_path.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
