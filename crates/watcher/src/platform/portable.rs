//! Portable backend built on `notify`
//!
//! `notify` runs its own OS watcher thread; its event handler translates each
//! event into a [`Packet`] and posts it to the session's completion channel,
//! so the session's background loop sees the same arm / wait / classify
//! protocol as on Windows. The configured filter is not applied here: every
//! event the OS facility reports is forwarded.

use super::channel::{channel, ChannelBackend, ChannelPort, Packet};
use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::session::SessionId;
use dirwatch_core::{ActionCode, ChangeRecord, WatchRoot};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

pub(crate) fn open(
    root: &WatchRoot,
    config: &WatchConfig,
    id: SessionId,
) -> Result<(ChannelBackend, ChannelPort)> {
    let (backend, port) = channel();
    let translator = Translator::new(root.as_path());

    let producer = port.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let packet = match res {
            Ok(event) => translator.translate(event),
            Err(err) => {
                warn!(session = %id, error = %err, "notify reported an error");
                Packet::Spurious
            }
        };
        // Fails only once the session has released the backend
        let _ = producer.post(packet);
    })
    .map_err(|err| WatchError::io("create notify watcher", into_io(err)))?;

    let mode = if config.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(root.as_path(), mode)
        .map_err(|err| WatchError::io("register notify watch", into_io(err)))?;

    debug!(session = %id, root = %root.as_str(), recursive = config.recursive, "notify watch registered");
    Ok((backend.with_source(watcher), port))
}

fn into_io(err: notify::Error) -> io::Error {
    match err.kind {
        notify::ErrorKind::Io(source) => source,
        kind => io::Error::other(notify::Error {
            kind,
            paths: err.paths,
        }),
    }
}

/// Maps `notify` events onto change records relative to the root
struct Translator {
    root: PathBuf,
    /// Resolved form of the root; some platforms report resolved paths
    resolved: Option<PathBuf>,
}

impl Translator {
    fn new(root: &Path) -> Self {
        let resolved = std::fs::canonicalize(root)
            .ok()
            .filter(|resolved| resolved != root);
        Self {
            root: root.to_path_buf(),
            resolved,
        }
    }

    fn translate(&self, event: Event) -> Packet {
        if event.need_rescan() {
            return Packet::Overflow;
        }

        if matches!(event.kind, EventKind::Remove(_)) && event.paths.iter().any(|p| self.is_root(p)) {
            return Packet::Fail(io::Error::new(
                io::ErrorKind::NotFound,
                "watch root was removed",
            ));
        }

        let records: Vec<ChangeRecord> = event
            .paths
            .iter()
            .filter_map(|path| {
                let action = action_for(&event.kind, path)?;
                let relative = self.relative(path)?;
                Some(ChangeRecord::new(relative, action))
            })
            .collect();

        if records.is_empty() {
            trace!(kind = ?event.kind, "event produced no records");
            return Packet::Spurious;
        }
        Packet::Records(records)
    }

    fn is_root(&self, path: &Path) -> bool {
        path == self.root || self.resolved.as_deref() == Some(path)
    }

    fn relative(&self, path: &Path) -> Option<OsString> {
        let relative = path
            .strip_prefix(&self.root)
            .ok()
            .or_else(|| {
                self.resolved
                    .as_deref()
                    .and_then(|resolved| path.strip_prefix(resolved).ok())
            });

        match relative {
            Some(relative) if !relative.as_os_str().is_empty() => {
                Some(relative.as_os_str().to_os_string())
            }
            Some(_) => None,
            None => {
                trace!(path = %path.display(), "event path outside the watch root");
                None
            }
        }
    }
}

/// Action code for one path of an event; `None` to drop it
fn action_for(kind: &EventKind, path: &Path) -> Option<ActionCode> {
    let code = match kind {
        EventKind::Create(_) => ActionCode::ADDED,
        EventKind::Remove(_) => ActionCode::REMOVED,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ActionCode::RENAMED_OLD_NAME,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ActionCode::RENAMED_NEW_NAME,
        // Sent after its From and To halves, which were already reported
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return None,
        // Direction unknown: whichever side still exists is the new name
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.exists() {
                ActionCode::RENAMED_NEW_NAME
            } else {
                ActionCode::RENAMED_OLD_NAME
            }
        }
        EventKind::Modify(_) => ActionCode::MODIFIED,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => ActionCode::MODIFIED,
        EventKind::Access(_) => return None,
        EventKind::Any | EventKind::Other => ActionCode(0),
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, Flag, RemoveKind};

    fn translator() -> Translator {
        Translator {
            root: PathBuf::from("/watched"),
            resolved: Some(PathBuf::from("/private/watched")),
        }
    }

    fn records(packet: Packet) -> Vec<(String, ActionCode)> {
        match packet {
            Packet::Records(records) => records
                .into_iter()
                .map(|r| (r.relative_path().to_string_lossy().into_owned(), r.action()))
                .collect(),
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_create_and_remove() {
        let t = translator();
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/watched/a.txt".into());
        assert_eq!(records(t.translate(created)), vec![("a.txt".to_string(), ActionCode::ADDED)]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/watched/sub/b".into());
        assert_eq!(
            records(t.translate(removed)),
            vec![(format!("sub{}b", std::path::MAIN_SEPARATOR), ActionCode::REMOVED)]
        );
    }

    #[test]
    fn test_rename_halves_are_reported_once() {
        let t = translator();
        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path("/watched/old".into());
        let to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path("/watched/new".into());
        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/watched/old".into())
            .add_path("/watched/new".into());

        assert_eq!(records(t.translate(from)), vec![("old".to_string(), ActionCode::RENAMED_OLD_NAME)]);
        assert_eq!(records(t.translate(to)), vec![("new".to_string(), ActionCode::RENAMED_NEW_NAME)]);
        // The paired event repeats both halves
        assert!(matches!(t.translate(both), Packet::Spurious));
    }

    #[test]
    fn test_data_change_and_close_write_are_modifications() {
        let t = translator();
        let data = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/watched/f".into());
        assert_eq!(records(t.translate(data)), vec![("f".to_string(), ActionCode::MODIFIED)]);

        let closed = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path("/watched/f".into());
        assert_eq!(records(t.translate(closed)), vec![("f".to_string(), ActionCode::MODIFIED)]);
    }

    #[test]
    fn test_reads_are_dropped() {
        let event = Event::new(EventKind::Access(AccessKind::Open(AccessMode::Read)))
            .add_path("/watched/f".into());
        assert!(matches!(translator().translate(event), Packet::Spurious));
    }

    #[test]
    fn test_unclassified_events_get_unknown_code() {
        let event = Event::new(EventKind::Other).add_path("/watched/f".into());
        assert_eq!(records(translator().translate(event)), vec![("f".to_string(), ActionCode(0))]);
    }

    #[test]
    fn test_resolved_root_prefix() {
        let event = Event::new(EventKind::Create(CreateKind::Any)).add_path("/private/watched/x".into());
        assert_eq!(records(translator().translate(event)), vec![("x".to_string(), ActionCode::ADDED)]);
    }

    #[test]
    fn test_paths_outside_root_are_dropped() {
        let event = Event::new(EventKind::Create(CreateKind::Any)).add_path("/elsewhere/x".into());
        assert!(matches!(translator().translate(event), Packet::Spurious));
    }

    #[test]
    fn test_rescan_is_overflow() {
        let event = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert!(matches!(translator().translate(event), Packet::Overflow));
    }

    #[test]
    fn test_root_removal_fails_the_read() {
        let event = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path("/watched".into());
        match translator().translate(event) {
            Packet::Fail(err) => assert_eq!(err.kind(), io::ErrorKind::NotFound),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
