//! Thread-safe FIFO bridging the watcher thread and the consumer

use crate::record::ChangeRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Ordered queue of change records
///
/// Shared between exactly one producer (the watch loop) and one consumer
/// (the notification pump). Every operation takes the lock once, so push,
/// peek and pop are atomic with respect to each other. Unbounded: a slow
/// consumer grows memory instead of losing records.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    entries: Mutex<VecDeque<ChangeRecord>>,
}

impl ChangeQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the tail
    ///
    /// Empty records are dropped.
    pub fn push(&self, record: ChangeRecord) {
        if record.is_empty() {
            return;
        }
        self.entries.lock().push_back(record);
    }

    /// Copy of the head, without removing it
    pub fn peek(&self) -> Option<ChangeRecord> {
        self.entries.lock().front().cloned()
    }

    /// Remove the head; no-op when empty
    pub fn pop(&self) {
        self.entries.lock().pop_front();
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
