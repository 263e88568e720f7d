//! Decoding of batched directory change buffers
//!
//! `ReadDirectoryChangesW` fills a caller-owned buffer with a chain of
//! variable-length `FILE_NOTIFY_INFORMATION` entries:
//!
//! ```text
//! offset 0   u32  NextEntryOffset   (0 marks the last entry)
//! offset 4   u32  Action
//! offset 8   u32  FileNameLength    (bytes, not characters)
//! offset 12  u16[] FileName         (not NUL terminated)
//! ```
//!
//! The decoder is plain byte walking so it builds and is tested on every
//! platform. It never reads past the slice it is given.

use crate::action::ActionCode;
use crate::record::ChangeRecord;
use thiserror::Error;

/// Buffer size used when none is configured
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Smallest accepted buffer size
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Largest accepted buffer size (the limit for watches on network shares)
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

const HEADER_LEN: usize = 12;

/// Malformed batch contents
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("entry header at offset {offset} runs past the {len}-byte batch")]
    TruncatedHeader { offset: usize, len: usize },

    #[error("file name at offset {offset} ({name_len} bytes) runs past the {len}-byte batch")]
    TruncatedName {
        offset: usize,
        name_len: usize,
        len: usize,
    },

    #[error("file name length {name_len} at offset {offset} is not a whole number of UTF-16 units")]
    OddNameLength { offset: usize, name_len: usize },
}

/// One decoded entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Action code as reported
    pub action: ActionCode,
    /// File name, UTF-16 code units
    pub name: Vec<u16>,
}

impl RawEntry {
    /// Convert into a queueable record
    pub fn into_record(self) -> ChangeRecord {
        ChangeRecord::from_wide(&self.name, self.action)
    }
}

/// Iterator over the entries of one completed batch
///
/// Yields at most one error, after which it is exhausted.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    batch: &'a [u8],
    offset: Option<usize>,
}

/// Walk the first `len` bytes of a completed read
pub fn entries(batch: &[u8]) -> Entries<'_> {
    Entries {
        batch,
        offset: if batch.is_empty() { None } else { Some(0) },
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<RawEntry, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset.take()?;
        let len = self.batch.len();

        if len.saturating_sub(offset) < HEADER_LEN {
            return Some(Err(BatchError::TruncatedHeader { offset, len }));
        }

        let next = read_u32(self.batch, offset) as usize;
        let action = ActionCode(read_u32(self.batch, offset + 4));
        let name_len = read_u32(self.batch, offset + 8) as usize;

        if name_len % 2 != 0 {
            return Some(Err(BatchError::OddNameLength { offset, name_len }));
        }
        let name_start = offset + HEADER_LEN;
        let name_end = match name_start.checked_add(name_len) {
            Some(end) if end <= len => end,
            _ => {
                return Some(Err(BatchError::TruncatedName {
                    offset,
                    name_len,
                    len,
                }))
            }
        };

        let name = self.batch[name_start..name_end]
            .chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .collect();

        if next != 0 {
            self.offset = offset.checked_add(next);
        }

        Some(Ok(RawEntry { action, name }))
    }
}

fn read_u32(batch: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([batch[at], batch[at + 1], batch[at + 2], batch[at + 3]])
}

/// Encode entries in the on-wire layout
///
/// Entries are padded to DWORD boundaries like the OS does. Useful for
/// simulated backends and tests.
pub fn encode_batch<'s>(entries: impl IntoIterator<Item = (ActionCode, &'s str)>) -> Vec<u8> {
    let entries: Vec<(ActionCode, Vec<u16>)> = entries
        .into_iter()
        .map(|(action, name)| (action, name.encode_utf16().collect()))
        .collect();

    let mut out = Vec::new();
    for (i, (action, name)) in entries.iter().enumerate() {
        let name_len = name.len() * 2;
        let entry_len = (HEADER_LEN + name_len + 3) & !3;
        let next = if i + 1 == entries.len() { 0 } else { entry_len };

        out.extend_from_slice(&(next as u32).to_le_bytes());
        out.extend_from_slice(&action.raw().to_le_bytes());
        out.extend_from_slice(&(name_len as u32).to_le_bytes());
        for unit in name {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.resize(out.len() + entry_len - HEADER_LEN - name_len, 0);
    }
    out
}

/// DWORD-aligned, fixed-size read buffer
///
/// The OS requires the buffer handed to `ReadDirectoryChangesW` to be
/// DWORD-aligned; backing it with `u32`s guarantees that.
#[derive(Debug)]
pub struct NotifyBuffer {
    words: Box<[u32]>,
}

impl NotifyBuffer {
    /// Allocate a zeroed buffer of `size` bytes, rounded up to whole DWORDs
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0u32; size.div_ceil(4)].into_boxed_slice(),
        }
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.words.len() * 4
    }

    /// Whether the buffer has zero capacity
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Pointer handed to the OS read call
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast()
    }

    /// Bytes of the buffer
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: u32 has no padding and any byte pattern is a valid u8; the
        // slice covers exactly the allocation and borrows `self`.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast(), self.len()) }
    }

    /// Entries of a completed read that transferred `transferred` bytes
    pub fn entries(&self, transferred: usize) -> Entries<'_> {
        let bytes = self.as_bytes();
        entries(&bytes[..transferred.min(bytes.len())])
    }
}
