//! Event records exchanged between backends, the dispatcher and user callbacks.
use std::ffi::{OsStr, OsString};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::WatchId;
use crate::options::UserData;
use crate::session::SessionHandle;

/// Raw action codes carried by [`RawEvent::action`].
pub mod action {
    pub const ADD: u32 = 1;
    pub const DELETE: u32 = 2;
    pub const MODIFIED: u32 = 3;
    pub const RENAMED: u32 = 4;
}

/// Kind of filesystem change.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Action {
    Add,
    Delete,
    Modified,
    Renamed,
}

impl Action {
    /// Decode a backend action code. Unknown codes yield `None`.
    pub const fn from_raw(code: u32) -> Option<Self> {
        match code {
            action::ADD => Some(Self::Add),
            action::DELETE => Some(Self::Delete),
            action::MODIFIED => Some(Self::Modified),
            action::RENAMED => Some(Self::Renamed),
            _ => None,
        }
    }

    pub const fn raw(self) -> u32 {
        match self {
            Self::Add => action::ADD,
            Self::Delete => action::DELETE,
            Self::Modified => action::MODIFIED,
            Self::Renamed => action::RENAMED,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::Modified => "MODIFIED",
            Self::Renamed => "RENAMED",
        })
    }
}

/// A single change as reported by a backend, before decoding.
#[derive(Debug, Copy, Clone)]
pub struct RawEvent<'a> {
    pub watch_id: WatchId,
    pub directory: &'a Path,
    pub basename: &'a OsStr,
    pub action: u32,
    /// Only meaningful for renames.
    pub old_basename: Option<&'a OsStr>,
}

/// A decoded change handed to a user callback.
#[derive(Debug, Copy, Clone)]
pub struct WatchEvent<'a> {
    pub session: SessionHandle,
    pub watch_id: WatchId,
    pub action: Action,
    /// Directory containing the changed entry.
    pub directory: &'a Path,
    pub basename: &'a OsStr,
    /// Previous basename, set for [`Action::Renamed`] only.
    pub old_basename: Option<&'a OsStr>,
    pub user_data: Option<&'a UserData>,
}

impl WatchEvent<'_> {
    /// Full path of the changed entry.
    pub fn path(&self) -> PathBuf {
        self.directory.join(self.basename)
    }
}

/// A callback failure handed to the watch's error callback.
#[derive(Debug, Copy, Clone)]
pub struct WatchFailure<'a> {
    pub session: SessionHandle,
    pub watch_id: WatchId,
    /// The action whose callback failed.
    pub action: Action,
    pub error: &'a anyhow::Error,
    pub user_data: Option<&'a UserData>,
}

/// An owned notification, suitable for queues and streams.
#[derive(Debug, Clone)]
pub enum Notification {
    Add {
        watch_id: WatchId,
        directory: PathBuf,
        name: OsString,
    },
    Delete {
        watch_id: WatchId,
        directory: PathBuf,
        name: OsString,
    },
    Modified {
        watch_id: WatchId,
        directory: PathBuf,
        name: OsString,
    },
    Renamed {
        watch_id: WatchId,
        directory: PathBuf,
        name: OsString,
        old_name: OsString,
    },
    Error {
        watch_id: WatchId,
        action: Action,
        error: Arc<anyhow::Error>,
    },
}

impl Notification {
    pub fn from_event(ev: &WatchEvent<'_>) -> Self {
        let watch_id = ev.watch_id;
        let directory = ev.directory.to_path_buf();
        let name = ev.basename.to_os_string();
        match ev.action {
            Action::Add => Self::Add {
                watch_id,
                directory,
                name,
            },
            Action::Delete => Self::Delete {
                watch_id,
                directory,
                name,
            },
            Action::Modified => Self::Modified {
                watch_id,
                directory,
                name,
            },
            Action::Renamed => Self::Renamed {
                watch_id,
                directory,
                name,
                old_name: ev.old_basename.map(OsStr::to_os_string).unwrap_or_default(),
            },
        }
    }

    pub fn from_failure(failure: &WatchFailure<'_>, error: anyhow::Error) -> Self {
        Self::Error {
            watch_id: failure.watch_id,
            action: failure.action,
            error: Arc::new(error),
        }
    }

    pub const fn watch_id(&self) -> WatchId {
        match self {
            Self::Add { watch_id, .. }
            | Self::Delete { watch_id, .. }
            | Self::Modified { watch_id, .. }
            | Self::Renamed { watch_id, .. }
            | Self::Error { watch_id, .. } => *watch_id,
        }
    }

    /// The change kind. For errors, the action whose callback failed.
    pub const fn action(&self) -> Action {
        match self {
            Self::Add { .. } => Action::Add,
            Self::Delete { .. } => Action::Delete,
            Self::Modified { .. } => Action::Modified,
            Self::Renamed { .. } => Action::Renamed,
            Self::Error { action, .. } => *action,
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        match self {
            Self::Add { directory, .. }
            | Self::Delete { directory, .. }
            | Self::Modified { directory, .. }
            | Self::Renamed { directory, .. } => Some(directory),
            Self::Error { .. } => None,
        }
    }

    pub fn name(&self) -> Option<&OsStr> {
        match self {
            Self::Add { name, .. }
            | Self::Delete { name, .. }
            | Self::Modified { name, .. }
            | Self::Renamed { name, .. } => Some(name),
            Self::Error { .. } => None,
        }
    }

    pub fn old_name(&self) -> Option<&OsStr> {
        match self {
            Self::Renamed { old_name, .. } => Some(old_name),
            _ => None,
        }
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl Display for Notification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Renamed {
                watch_id,
                directory,
                name,
                old_name,
            } => write!(
                f,
                "[{}] RENAMED {:?}: {:?} -> {:?}",
                watch_id, directory, old_name, name
            ),
            Self::Error {
                watch_id,
                action,
                error,
            } => write!(f, "[{}] ERROR during {}: {}", watch_id, action, error),
            Self::Add {
                watch_id,
                directory,
                name,
            }
            | Self::Delete {
                watch_id,
                directory,
                name,
            }
            | Self::Modified {
                watch_id,
                directory,
                name,
            } => write!(
                f,
                "[{}] {} {:?}: {:?}",
                watch_id,
                self.action(),
                directory,
                name
            ),
        }
    }
}
