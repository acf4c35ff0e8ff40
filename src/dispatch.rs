//! Routing of raw backend events into typed callbacks.
#![allow(clippy::module_name_repetitions)]

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::anyhow;
use log::{debug, error, warn};

use crate::context::WatchContext;
use crate::error::WatchId;
use crate::event::{Action, RawEvent, WatchEvent, WatchFailure};
use crate::session::SessionHandle;

/// What happened to a raw event.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Dispatched {
    /// The matching callback ran and succeeded.
    Delivered,
    /// The matching callback failed and the error callback accepted the failure.
    Recovered,
    /// No callback ran.
    Dropped(DropReason),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DropReason {
    UnknownAction,
    NoContext,
    WatchRemoved,
    NoCallback,
}

/// Invoked on backend threads, once per raw event.
///
/// Events are handled synchronously and one at a time per call, so the order a backend reports
/// them in is the order callbacks see them.
#[derive(Debug, Copy, Clone)]
pub struct EventDispatcher {
    session: SessionHandle,
}

impl EventDispatcher {
    pub const fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// Decode `raw` and run the matching callback of `context`.
    ///
    /// A failing callback is offered to the context's error callback. When there is none, or it
    /// fails too, the process is aborted.
    pub fn dispatch(&self, context: Option<&WatchContext>, raw: &RawEvent<'_>) -> Dispatched {
        let Some(action) = Action::from_raw(raw.action) else {
            warn!(
                "Dropping event with unknown action code {} for watch {}",
                raw.action, raw.watch_id
            );
            return Dispatched::Dropped(DropReason::UnknownAction);
        };
        let Some(context) = context else {
            debug!("Dropping {} event for watch {} without context", action, raw.watch_id);
            return Dispatched::Dropped(DropReason::NoContext);
        };
        let Some(_delivery) = context.begin_delivery() else {
            debug!("Dropping {} event for removed watch {}", action, raw.watch_id);
            return Dispatched::Dropped(DropReason::WatchRemoved);
        };
        let Some(callback) = context.callback(action) else {
            return Dispatched::Dropped(DropReason::NoCallback);
        };

        let event = WatchEvent {
            session: self.session,
            watch_id: raw.watch_id,
            action,
            directory: raw.directory,
            basename: raw.basename,
            old_basename: if action == Action::Renamed {
                raw.old_basename
            } else {
                None
            },
            user_data: context.user_data(),
        };

        let err = match guarded(|| callback(&event)) {
            Ok(()) => return Dispatched::Delivered,
            Err(err) => err,
        };
        error!(
            "{} callback for watch {} failed: {:#}",
            action, raw.watch_id, err
        );

        let Some(on_error) = context.error_callback() else {
            fatal(raw.watch_id, action, &err);
        };
        let failure = WatchFailure {
            session: self.session,
            watch_id: raw.watch_id,
            action,
            error: &err,
            user_data: context.user_data(),
        };
        if let Err(handler_err) = guarded(|| on_error(&failure)) {
            error!(
                "error callback for watch {} failed: {:#}",
                raw.watch_id, handler_err
            );
            fatal(raw.watch_id, action, &err);
        }
        Dispatched::Recovered
    }
}

/// Run a user callback, turning a panic into an error.
fn guarded(f: impl FnOnce() -> anyhow::Result<()>) -> anyhow::Result<()> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
}

fn panic_error(payload: &(dyn Any + Send)) -> anyhow::Error {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        anyhow!("callback panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        anyhow!("callback panicked: {}", msg)
    } else {
        anyhow!("callback panicked")
    }
}

fn fatal(id: WatchId, action: Action, err: &anyhow::Error) -> ! {
    error!(
        "Unhandled failure in {} callback for watch {}: {:#}; aborting",
        action, id, err
    );
    std::process::abort()
}
