//! Watch session configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! buffer_size = 16384
//! recursive = true
//! filter = ["file_name", "dir_name", "last_write"]
//! flush_on_close = false
//! ```

use crate::error::{Result, WatchError};
use dirwatch_core::notify_info::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Categories of change the OS is asked to report
///
/// Maps one-to-one onto the `FILE_NOTIFY_CHANGE_*` flags. The portable
/// backend always reports everything its OS facility offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeFilter {
    FileName,
    DirName,
    Attributes,
    Size,
    LastWrite,
    LastAccess,
    Creation,
    Security,
}

impl ChangeFilter {
    /// Every category, the default superset
    pub const ALL: [ChangeFilter; 8] = [
        ChangeFilter::FileName,
        ChangeFilter::DirName,
        ChangeFilter::Attributes,
        ChangeFilter::Size,
        ChangeFilter::LastWrite,
        ChangeFilter::LastAccess,
        ChangeFilter::Creation,
        ChangeFilter::Security,
    ];

    /// `FILE_NOTIFY_CHANGE_*` bit for this category
    pub const fn mask(self) -> u32 {
        match self {
            ChangeFilter::FileName => 0x0001,
            ChangeFilter::DirName => 0x0002,
            ChangeFilter::Attributes => 0x0004,
            ChangeFilter::Size => 0x0008,
            ChangeFilter::LastWrite => 0x0010,
            ChangeFilter::LastAccess => 0x0020,
            ChangeFilter::Creation => 0x0040,
            ChangeFilter::Security => 0x0100,
        }
    }
}

/// Configuration for a watch session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Size in bytes of the fixed read buffer
    ///
    /// A batch that does not fit is dropped by the OS and counted as an
    /// overflow; the buffer never grows.
    pub buffer_size: usize,

    /// Watch the whole subtree instead of the root's direct children
    pub recursive: bool,

    /// Change categories to report
    pub filter: Vec<ChangeFilter>,

    /// Deliver already-queued events during `close`
    ///
    /// Records that arrive after the flush are discarded either way.
    pub flush_on_close: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            recursive: true,
            filter: ChangeFilter::ALL.to_vec(),
            flush_on_close: true,
        }
    }
}

impl WatchConfig {
    /// Parse from TOML, filling missing keys with defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: WatchConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| WatchError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check that the configuration can be used to start a session
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(WatchError::Config(format!(
                "buffer_size {} is outside {}..={}",
                self.buffer_size, MIN_BUFFER_SIZE, MAX_BUFFER_SIZE
            )));
        }
        if self.buffer_size % 4 != 0 {
            return Err(WatchError::Config(format!(
                "buffer_size {} is not a multiple of 4",
                self.buffer_size
            )));
        }
        if self.filter.is_empty() {
            return Err(WatchError::Config("filter must name at least one change category".into()));
        }
        Ok(())
    }

    /// Union of the configured filter bits
    pub fn filter_mask(&self) -> u32 {
        self.filter.iter().fold(0, |mask, f| mask | f.mask())
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_filter(mut self, filter: impl IntoIterator<Item = ChangeFilter>) -> Self {
        self.filter = filter.into_iter().collect();
        self
    }

    pub fn flush_on_close(mut self, flush: bool) -> Self {
        self.flush_on_close = flush;
        self
    }
}
