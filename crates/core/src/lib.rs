//! dirwatch core - leaf types shared by the watch engine
//!
//! This crate provides the pieces that do not touch the OS:
//! - Change records and OS action codes
//! - The total action -> event kind mapping
//! - Watch root and path normalization
//! - The thread-safe change queue
//! - Decoding of batched `FILE_NOTIFY_INFORMATION` buffers

pub mod action;
pub mod notify_info;
pub mod path;
pub mod queue;
pub mod record;

// Re-export main types for convenience
pub use action::{classify, ActionCode, EventKind};
pub use notify_info::{BatchError, NotifyBuffer, RawEntry};
pub use path::{RootError, WatchRoot, CANONICAL_SEPARATOR};
pub use queue::ChangeQueue;
pub use record::{ChangeRecord, NormalizedEvent};
