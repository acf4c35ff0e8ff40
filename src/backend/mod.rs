//! The capability sessions consume to observe the filesystem.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::WatchId;
use crate::event::RawEvent;
use crate::options::RawOption;

pub use watcher::NotifyBackend;

#[cfg(target_os = "linux")]
mod mounts;
mod translate;
mod watcher;

/// Callback a backend invokes for every change it observes on a watch.
///
/// May be called from any backend thread, concurrently for different watches.
pub type Trampoline = Arc<dyn Fn(RawEvent<'_>) + Send + Sync>;

/// A native or polling filesystem observer.
pub trait Backend: Send {
    /// Begin observing `path`.
    ///
    /// Return a non-negative watch identifier, or one of the negative codes in
    /// [`status`](crate::error::status). `trampoline` is kept until the watch is removed.
    fn add_watch(
        &mut self,
        path: &Path,
        recursive: bool,
        options: &[RawOption],
        trampoline: Trampoline,
    ) -> i64;

    /// Stop observing `id` and release its trampoline. Unknown identifiers are ignored.
    fn remove_watch(&mut self, id: WatchId);

    fn remove_watch_path(&mut self, path: &Path);

    /// Allow events to reach trampolines. Changes observed before this are discarded.
    fn start(&mut self);

    fn set_follow_symlinks(&mut self, follow: bool);

    fn follow_symlinks(&self) -> bool;
}

/// Build the `notify`-based backend: native unless `use_generic` asks for polling.
pub fn create_backend(use_generic: bool, poll_interval: Duration) -> Box<dyn Backend> {
    Box::new(if use_generic {
        NotifyBackend::polling(poll_interval)
    } else {
        NotifyBackend::native()
    })
}

#[cfg(not(target_os = "linux"))]
mod mounts {
    pub fn is_remote(_path: &std::path::Path) -> bool {
        false
    }
}
