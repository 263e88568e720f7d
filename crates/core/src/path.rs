//! Watch root and path normalization
//!
//! Consumers always see `/`-separated UTF-8 paths. Both `\` and `/` count as
//! separators in reported names, whatever the host platform.

use crate::record::{ChangeRecord, NormalizedEvent};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Separator used in every delivered path
pub const CANONICAL_SEPARATOR: char = '/';

/// Reasons a root path cannot be watched
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RootError {
    #[error("watch root is empty")]
    Empty,

    #[error("watch root contains a NUL character")]
    InteriorNul,

    #[error("watch root is not valid Unicode: {0}")]
    NotUnicode(PathBuf),
}

/// Directory being watched, normalized once at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoot {
    /// Path handed to the OS
    native: PathBuf,
    /// Canonical text form, as given
    display: String,
    /// Canonical text form with exactly one trailing separator
    prefix: String,
}

impl WatchRoot {
    /// Validate and normalize a root path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, RootError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(RootError::Empty);
        }

        let text = path
            .to_str()
            .ok_or_else(|| RootError::NotUnicode(path.to_path_buf()))?;
        if text.contains('\0') {
            return Err(RootError::InteriorNul);
        }

        let display = canonicalize_separators(text);
        let mut prefix = display.trim_end_matches(CANONICAL_SEPARATOR).to_string();
        prefix.push(CANONICAL_SEPARATOR);

        Ok(Self {
            native: path.to_path_buf(),
            display,
            prefix,
        })
    }

    /// Path in the form the OS was given
    pub fn as_path(&self) -> &Path {
        &self.native
    }

    /// Root as `/`-separated text
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Join a reported relative path onto the root
    pub fn join(&self, relative: &OsStr) -> String {
        let relative = relative.to_string_lossy();
        let relative = relative.trim_start_matches(is_separator);

        let mut full = String::with_capacity(self.prefix.len() + relative.len());
        full.push_str(&self.prefix);
        full.extend(relative.chars().map(|c| {
            if is_separator(c) {
                CANONICAL_SEPARATOR
            } else {
                c
            }
        }));
        full
    }

    /// Turn a queued record into the event a consumer sees
    pub fn normalize(&self, record: &ChangeRecord) -> NormalizedEvent {
        NormalizedEvent {
            full_path: self.join(record.relative_path()),
            kind: record.kind(),
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// Rewrite every separator to [`CANONICAL_SEPARATOR`]
pub fn canonicalize_separators(text: &str) -> String {
    text.replace('\\', "/")
}
