//! Callback-based directory watch sessions over native filesystem notification backends.
//!
//! ## Features
//!
//! - Several watches per session, each with its own callbacks and user data.
//! - Native backends (inotify, `FSEvents`, kqueue, `ReadDirectoryChangesW`) through
//!   [`notify`](https://github.com/notify-rs/notify), or a portable polling backend.
//! - Rename halves folded into a single rename event carrying the old and new names.
//! - Callback failures routed to a per-watch error callback.
//!
//! ## Example
//!
//! ```rust
//! use dirwatch::{Session, WatchOptions};
//!
//! let dir = tempfile::tempdir().expect("to be created");
//! let mut session = Session::new(false);
//! let id = session
//!     .add_watch(
//!         dir.path(),
//!         WatchOptions::new()
//!             .recursive(true)
//!             .on_add(|ev| {
//!                 println!("added {:?}", ev.path());
//!                 Ok(())
//!             })
//!             .on_error(|failure| {
//!                 eprintln!("callback for {} failed: {}", failure.watch_id, failure.error);
//!                 Ok(())
//!             }),
//!     )
//!     .expect("watch to be added");
//! session.start();
//!
//! std::fs::write(dir.path().join("file"), b"hello").expect("to be written");
//! session.remove_watch(id);
//! ```
//!
//! ## Streams
//!
//! With the `tokio` feature (enabled by default), [`Session::add_watch_stream`] returns a
//! [`NotificationStream`](stream::NotificationStream) instead of taking callbacks.
//!
//! ## License
//!
//! This project is licensed under MIT License.

pub mod backend;
mod context;
mod dispatch;
pub mod error;
pub mod event;
pub mod flags;
pub mod options;
mod registry;
pub mod session;
#[cfg(feature = "tokio")]
pub mod stream;
#[cfg(test)]
mod tests;
mod utils;

pub use error::{clear_last_error, last_error_message, WatchError, WatchId};
pub use event::{Action, Notification, RawEvent, WatchEvent, WatchFailure};
pub use options::{MacModifiedSource, PlatformOptions, UserData, WatchOptions};
pub use session::{Session, SessionConfig, SessionHandle};
