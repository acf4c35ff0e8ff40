//! Folding `notify` events into add/delete/modified/renamed changes.
use std::iter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use either::Either;
use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};

use crate::event::action;
use crate::flags::ModifiedSources;

/// One change in raw form, with full paths.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Change {
    pub action: u32,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
}

impl Change {
    fn new(action: u32, path: PathBuf) -> Self {
        Self {
            action,
            path,
            old_path: None,
        }
    }
}

/// How long a `From` half waits for its `To` before it is reported as a delete.
pub const RENAME_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct PendingFrom {
    tracker: Option<usize>,
    path: PathBuf,
    since: Instant,
}

/// Per-watch translation state.
///
/// Backends report a rename as separate halves (`From`, then `To`, and on inotify a trailing
/// `Both`), or as bare `Any` events on each side. Halves are paired into a single rename; a
/// `From` nobody claims becomes a delete once the next event arrives or [`RENAME_WINDOW`]
/// passes, whichever comes first. An unpaired `To` becomes an add.
#[derive(Debug)]
pub struct Translator {
    sources: ModifiedSources,
    pending_from: Option<PendingFrom>,
    paired: Option<(PathBuf, PathBuf)>,
}

impl Translator {
    pub const fn new(sources: ModifiedSources) -> Self {
        Self {
            sources,
            pending_from: None,
            paired: None,
        }
    }

    pub fn translate(&mut self, event: &Event) -> Vec<Change> {
        let mut out = Vec::new();
        let tracker = event.tracker();
        match event.kind {
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => {
                    for path in &event.paths {
                        self.rename_from(&mut out, tracker, path);
                    }
                }
                RenameMode::To => {
                    for path in &event.paths {
                        self.rename_to(&mut out, tracker, path);
                    }
                }
                RenameMode::Both => {
                    self.flush(&mut out);
                    if let [from, to, ..] = event.paths.as_slice() {
                        let already_paired = self
                            .paired
                            .take()
                            .map_or(false, |(f, t)| &f == from && &t == to);
                        if !already_paired {
                            push_rename(&mut out, from, to);
                        }
                    }
                }
                RenameMode::Any | RenameMode::Other => {
                    for path in &event.paths {
                        if path.symlink_metadata().is_ok() {
                            self.rename_to(&mut out, tracker, path);
                        } else {
                            self.rename_from(&mut out, tracker, path);
                        }
                    }
                }
            },
            kind => {
                self.flush(&mut out);
                self.paired = None;
                out.extend(self.plain(kind, &event.paths));
            }
        }
        out
    }

    /// When the parked `From` half expires, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending_from
            .as_ref()
            .map(|pending| pending.since + RENAME_WINDOW)
    }

    /// Report a parked `From` half as a delete once its window has passed at `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<Change> {
        let mut out = Vec::new();
        if self.deadline().map_or(false, |deadline| deadline <= now) {
            self.flush(&mut out);
        }
        out
    }

    fn plain<'a>(
        &self,
        kind: EventKind,
        paths: &'a [PathBuf],
    ) -> impl Iterator<Item = Change> + 'a {
        let code = match kind {
            EventKind::Create(_) => Some(action::ADD),
            EventKind::Remove(_) => Some(action::DELETE),
            EventKind::Modify(modify) if self.sources.intersects(sources_of(modify)) => {
                Some(action::MODIFIED)
            }
            _ => None,
        };
        match code {
            Some(code) => Either::Left(paths.iter().map(move |p| Change::new(code, p.clone()))),
            None => Either::Right(iter::empty()),
        }
    }

    fn rename_from(&mut self, out: &mut Vec<Change>, tracker: Option<usize>, path: &Path) {
        self.flush(out);
        self.paired = None;
        self.pending_from = Some(PendingFrom {
            tracker,
            path: path.to_path_buf(),
            since: Instant::now(),
        });
    }

    fn rename_to(&mut self, out: &mut Vec<Change>, tracker: Option<usize>, path: &Path) {
        match self.pending_from.take() {
            Some(pending) if pending.tracker == tracker => {
                push_rename(out, &pending.path, path);
                self.paired = Some((pending.path, path.to_path_buf()));
            }
            stale => {
                if let Some(pending) = stale {
                    out.push(Change::new(action::DELETE, pending.path));
                }
                self.paired = None;
                out.push(Change::new(action::ADD, path.to_path_buf()));
            }
        }
    }

    fn flush(&mut self, out: &mut Vec<Change>) {
        if let Some(pending) = self.pending_from.take() {
            out.push(Change::new(action::DELETE, pending.path));
        }
    }
}

/// A rename within one directory is reported as such; across directories it is a delete in the
/// old one and an add in the new one.
fn push_rename(out: &mut Vec<Change>, from: &Path, to: &Path) {
    if from.parent() == to.parent() {
        out.push(Change {
            action: action::RENAMED,
            path: to.to_path_buf(),
            old_path: Some(from.to_path_buf()),
        });
    } else {
        out.push(Change::new(action::DELETE, from.to_path_buf()));
        out.push(Change::new(action::ADD, to.to_path_buf()));
    }
}

fn sources_of(modify: ModifyKind) -> ModifiedSources {
    match modify {
        ModifyKind::Any | ModifyKind::Other | ModifyKind::Data(_) => ModifiedSources::CONTENT,
        ModifyKind::Metadata(MetadataKind::WriteTime) => ModifiedSources::CONTENT,
        ModifyKind::Metadata(MetadataKind::Ownership) => ModifiedSources::OWNER,
        ModifyKind::Metadata(MetadataKind::Extended) => ModifiedSources::XATTR,
        ModifyKind::Metadata(MetadataKind::Other) => ModifiedSources::FINDER_INFO,
        ModifyKind::Metadata(_) => ModifiedSources::INODE_META,
        ModifyKind::Name(_) => ModifiedSources::empty(),
    }
}
