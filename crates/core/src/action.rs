//! OS action codes and their mapping to event kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// OS-native change action code
///
/// The named constants carry the values `ReadDirectoryChangesW` reports in
/// `FILE_NOTIFY_INFORMATION::Action`. Other backends translate into the same
/// numbering. Any other value is legal and treated as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionCode(pub u32);

impl ActionCode {
    /// File or directory added (`FILE_ACTION_ADDED`)
    pub const ADDED: Self = Self(1);
    /// File or directory removed (`FILE_ACTION_REMOVED`)
    pub const REMOVED: Self = Self(2);
    /// Contents, attributes or timestamps changed (`FILE_ACTION_MODIFIED`)
    pub const MODIFIED: Self = Self(3);
    /// Old name of a renamed entry (`FILE_ACTION_RENAMED_OLD_NAME`)
    pub const RENAMED_OLD_NAME: Self = Self(4);
    /// New name of a renamed entry (`FILE_ACTION_RENAMED_NEW_NAME`)
    pub const RENAMED_NEW_NAME: Self = Self(5);

    /// Raw numeric value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is one of the five documented codes
    pub const fn is_known(self) -> bool {
        matches!(self.0, 1..=5)
    }
}

impl From<u32> for ActionCode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Kind of change delivered to the consumer
///
/// Serialized as `"rename"` / `"change"`, the names `fs.watch`-style
/// consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Entry appeared, disappeared or changed name
    Rename,
    /// Entry changed in place
    Change,
}

impl EventKind {
    /// Lowercase name of the kind
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Rename => "rename",
            EventKind::Change => "change",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an action code to an event kind
///
/// Total: unknown codes fall back to [`EventKind::Change`].
pub const fn classify(code: ActionCode) -> EventKind {
    match code {
        ActionCode::ADDED
        | ActionCode::REMOVED
        | ActionCode::RENAMED_OLD_NAME
        | ActionCode::RENAMED_NEW_NAME => EventKind::Rename,
        _ => EventKind::Change,
    }
}

impl From<ActionCode> for EventKind {
    fn from(code: ActionCode) -> Self {
        classify(code)
    }
}
