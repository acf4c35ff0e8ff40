//! Registration failures and the process-wide diagnostic slot.
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use thiserror::Error;

/// Raw status codes a backend returns in place of a watch identifier.
pub mod status {
    pub const NOT_FOUND: i64 = -1;
    pub const REPEATED: i64 = -2;
    pub const OUT_OF_SCOPE: i64 = -3;
    pub const NOT_READABLE: i64 = -4;
    pub const REMOTE: i64 = -5;
    pub const WATCH_FAILED: i64 = -6;
    pub const UNSPECIFIED: i64 = -7;
}

/// Identifier of an active watch, issued by the backend.
///
/// Unique among the watches currently active in a session. A backend may hand out the same
/// value again once the watch it named has been removed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WatchId(i64);

impl WatchId {
    pub(crate) const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw, always non-negative, value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl Display for WatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl TryFrom<i64> for WatchId {
    type Error = WatchError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        WatchError::from_code(code)
    }
}

/// Why a watch could not be established.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Error)]
pub enum WatchError {
    #[error("directory not found")]
    NotFound,
    #[error("directory is already watched")]
    Repeated,
    #[error("directory is out of scope")]
    OutOfScope,
    #[error("directory is not readable")]
    NotReadable,
    #[error("remote filesystems are not supported by this backend")]
    Remote,
    #[error("backend failed to establish monitoring")]
    WatchFailed,
    #[error("unspecified backend failure")]
    Unspecified,
    #[error("unexpected backend status code {0}")]
    Unexpected(i64),
}

impl WatchError {
    /// Decode a backend return value.
    ///
    /// Total over `i64`: non-negative values are identifiers, known negative codes map to their
    /// kind and everything else becomes [`WatchError::Unexpected`].
    pub const fn from_code(code: i64) -> Result<WatchId, Self> {
        Err(match code {
            0.. => return Ok(WatchId(code)),
            status::NOT_FOUND => Self::NotFound,
            status::REPEATED => Self::Repeated,
            status::OUT_OF_SCOPE => Self::OutOfScope,
            status::NOT_READABLE => Self::NotReadable,
            status::REMOTE => Self::Remote,
            status::WATCH_FAILED => Self::WatchFailed,
            status::UNSPECIFIED => Self::Unspecified,
            _ => Self::Unexpected(code),
        })
    }

    /// The raw status code of this error.
    pub const fn code(self) -> i64 {
        match self {
            Self::NotFound => status::NOT_FOUND,
            Self::Repeated => status::REPEATED,
            Self::OutOfScope => status::OUT_OF_SCOPE,
            Self::NotReadable => status::NOT_READABLE,
            Self::Remote => status::REMOTE,
            Self::WatchFailed => status::WATCH_FAILED,
            Self::Unspecified => status::UNSPECIFIED,
            Self::Unexpected(code) => code,
        }
    }
}

static LAST_ERROR: Lazy<Mutex<String>> = Lazy::new(|| Mutex::new(String::new()));

/// The message left behind by the most recent backend failure, or an empty string.
pub fn last_error_message() -> String {
    LAST_ERROR
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Reset the diagnostic slot read by [`last_error_message`].
pub fn clear_last_error() {
    LAST_ERROR
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

pub(crate) fn set_last_error(message: impl Into<String>) {
    *LAST_ERROR.lock().unwrap_or_else(PoisonError::into_inner) = message.into();
}
