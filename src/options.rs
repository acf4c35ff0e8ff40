//! Per-watch configuration.
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::event::{WatchEvent, WatchFailure};
use crate::flags::{ModifiedSources, NotifyFilter};

/// Caller-owned value handed unchanged to every callback of a watch.
pub type UserData = Arc<dyn Any + Send + Sync>;

pub type EventCallback = Box<dyn Fn(&WatchEvent<'_>) -> anyhow::Result<()> + Send + Sync>;

pub type ErrorCallback = Box<dyn Fn(&WatchFailure<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Raw option kinds understood by backends, paired with their values in [`RawOption`].
pub mod option_kind {
    /// Size in bytes of the `ReadDirectoryChangesW` buffer.
    pub const WINDOWS_BUFFER_SIZE: u32 = 1;
    /// `FILE_NOTIFY_CHANGE_*` mask.
    pub const WINDOWS_NOTIFY_FILTER: u32 = 2;
    /// [`ModifiedSources`](crate::flags::ModifiedSources) bits reported as modifications.
    pub const MAC_MODIFIED_FILTER: u32 = 3;
}

/// Backend option in its raw encoding.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RawOption {
    pub kind: u32,
    pub value: i64,
}

/// Modification sources that can be excluded on macOS.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MacModifiedSource {
    FinderInfo,
    Inode,
}

impl MacModifiedSource {
    pub const fn sources(self) -> ModifiedSources {
        match self {
            Self::FinderInfo => ModifiedSources::FINDER_INFO,
            Self::Inode => ModifiedSources::INODE_META,
        }
    }
}

/// Platform specific tuning. Options for other platforms are ignored.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PlatformOptions {
    pub windows_buffer_size: Option<u32>,
    pub windows_notify_filter: Option<NotifyFilter>,
    pub mac_exclude_modified_sources: Vec<MacModifiedSource>,
}

impl PlatformOptions {
    pub fn is_empty(&self) -> bool {
        self.windows_buffer_size.is_none()
            && self.windows_notify_filter.is_none()
            && self.mac_exclude_modified_sources.is_empty()
    }

    /// Encode into backend options.
    pub fn to_raw(&self) -> Vec<RawOption> {
        let mut raw = Vec::new();
        if let Some(size) = self.windows_buffer_size {
            raw.push(RawOption {
                kind: option_kind::WINDOWS_BUFFER_SIZE,
                value: i64::from(size),
            });
        }
        if let Some(filter) = self.windows_notify_filter {
            raw.push(RawOption {
                kind: option_kind::WINDOWS_NOTIFY_FILTER,
                value: i64::from(filter.bits()),
            });
        }
        if !self.mac_exclude_modified_sources.is_empty() {
            let excluded = self
                .mac_exclude_modified_sources
                .iter()
                .fold(ModifiedSources::empty(), |acc, source| acc | source.sources());
            raw.push(RawOption {
                kind: option_kind::MAC_MODIFIED_FILTER,
                value: i64::from((ModifiedSources::all() - excluded).bits()),
            });
        }
        raw
    }
}

/// Callbacks and settings for a single watch.
///
/// Callbacks run on a backend thread, synchronously with event delivery. They must not block
/// indefinitely and must not call back into the session's mutating methods.
#[derive(Default)]
pub struct WatchOptions {
    pub(crate) on_add: Option<EventCallback>,
    pub(crate) on_delete: Option<EventCallback>,
    pub(crate) on_modified: Option<EventCallback>,
    pub(crate) on_renamed: Option<EventCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) recursive: bool,
    pub(crate) platform: PlatformOptions,
    pub(crate) user_data: Option<UserData>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_add<F>(mut self, f: F) -> Self
    where
        F: Fn(&WatchEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_add = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&WatchEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_delete = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_modified<F>(mut self, f: F) -> Self
    where
        F: Fn(&WatchEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_modified = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_renamed<F>(mut self, f: F) -> Self
    where
        F: Fn(&WatchEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_renamed = Some(Box::new(f));
        self
    }

    /// Register the same callback for every change kind.
    #[must_use]
    pub fn on_any<F>(self, f: F) -> Self
    where
        F: Fn(&WatchEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let (add, delete, modified) = (f.clone(), f.clone(), f.clone());
        self.on_add(move |ev| add(ev))
            .on_delete(move |ev| delete(ev))
            .on_modified(move |ev| modified(ev))
            .on_renamed(move |ev| f(ev))
    }

    /// Handle failures of the other callbacks. Without one, a failing callback aborts the
    /// process.
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&WatchFailure<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    #[must_use]
    pub fn platform(mut self, platform: PlatformOptions) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn user_data(mut self, user_data: UserData) -> Self {
        self.user_data = Some(user_data);
        self
    }

    pub const fn is_recursive(&self) -> bool {
        self.recursive
    }
}

impl Debug for WatchOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchOptions")
            .field("on_add", &self.on_add.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("on_modified", &self.on_modified.is_some())
            .field("on_renamed", &self.on_renamed.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("recursive", &self.recursive)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}
