//! Change records as reported by the OS and as delivered to consumers

use crate::action::{ActionCode, EventKind};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};

/// One filesystem event as reported by the OS facility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Path relative to the watch root, OS-native encoding
    relative_path: OsString,
    /// OS action code
    action: ActionCode,
}

impl ChangeRecord {
    /// Create a record from a native relative path
    pub fn new(relative_path: impl Into<OsString>, action: ActionCode) -> Self {
        Self {
            relative_path: relative_path.into(),
            action,
        }
    }

    /// Create a record from a UTF-16 file name as found in a notify buffer
    ///
    /// On Windows the name is kept exactly (unpaired surrogates included).
    /// Elsewhere it is decoded lossily.
    pub fn from_wide(name: &[u16], action: ActionCode) -> Self {
        #[cfg(windows)]
        let relative_path = {
            use std::os::windows::ffi::OsStringExt;
            OsString::from_wide(name)
        };
        #[cfg(not(windows))]
        let relative_path = OsString::from(String::from_utf16_lossy(name));

        Self {
            relative_path,
            action,
        }
    }

    /// Path relative to the watch root
    pub fn relative_path(&self) -> &OsStr {
        &self.relative_path
    }

    /// OS action code
    pub fn action(&self) -> ActionCode {
        self.action
    }

    /// Event kind this record maps to
    pub fn kind(&self) -> EventKind {
        self.action.into()
    }

    /// A record without a path carries nothing to deliver
    pub fn is_empty(&self) -> bool {
        self.relative_path.is_empty()
    }
}

/// A change in the form handed to consumers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Root joined with the relative path, `/`-separated UTF-8
    pub full_path: String,
    /// Rename or change
    pub kind: EventKind,
}
