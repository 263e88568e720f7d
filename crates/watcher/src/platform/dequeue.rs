//! Classification of completion-port dequeues
//!
//! Kept free of FFI so the rules are checked on every host; the Windows
//! backend fills in a [`Dequeued`] from `GetQueuedCompletionStatus`.

use super::Completion;

/// Completion key of the wake-up sentinel; session keys start at 1
pub(crate) const WAKE_KEY: usize = 0;

/// What one `GetQueuedCompletionStatus` call reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Dequeued {
    /// The call returned success
    pub(crate) ok: bool,
    pub(crate) transferred: u32,
    pub(crate) key: usize,
    /// No OVERLAPPED came back with the packet
    pub(crate) no_overlapped: bool,
    /// The OVERLAPPED is the one our pending read was issued with
    pub(crate) ours: bool,
}

/// How the watch loop must react to a dequeue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed(Completion),
    /// The wait itself or our read failed
    Failed,
}

impl Dequeued {
    pub(crate) fn classify(self, own_key: usize) -> Outcome {
        if !self.ok {
            if self.no_overlapped || self.ours {
                return Outcome::Failed;
            }
            return Outcome::Completed(Completion::Spurious);
        }

        let completion = if self.no_overlapped {
            if self.transferred == 0 && self.key == WAKE_KEY {
                Completion::Wakeup
            } else {
                Completion::Spurious
            }
        } else if !self.ours || self.key != own_key {
            Completion::Spurious
        } else if self.transferred == 0 {
            Completion::Overflow
        } else {
            Completion::Batch
        };
        Outcome::Completed(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN_KEY: usize = 7;

    fn read_done(transferred: u32) -> Dequeued {
        Dequeued {
            ok: true,
            transferred,
            key: OWN_KEY,
            no_overlapped: false,
            ours: true,
        }
    }

    fn posted(transferred: u32, key: usize) -> Dequeued {
        Dequeued {
            ok: true,
            transferred,
            key,
            no_overlapped: true,
            ours: false,
        }
    }

    #[test]
    fn test_sentinel_is_wakeup() {
        assert_eq!(posted(0, WAKE_KEY).classify(OWN_KEY), Outcome::Completed(Completion::Wakeup));
    }

    #[test]
    fn test_packet_without_overlapped_is_retried() {
        assert_eq!(posted(64, WAKE_KEY).classify(OWN_KEY), Outcome::Completed(Completion::Spurious));
        assert_eq!(posted(0, OWN_KEY).classify(OWN_KEY), Outcome::Completed(Completion::Spurious));
    }

    #[test]
    fn test_empty_read_is_overflow() {
        assert_eq!(read_done(0).classify(OWN_KEY), Outcome::Completed(Completion::Overflow));
    }

    #[test]
    fn test_read_with_bytes_is_batch() {
        assert_eq!(read_done(128).classify(OWN_KEY), Outcome::Completed(Completion::Batch));
    }

    #[test]
    fn test_foreign_completions_are_spurious() {
        let wrong_key = Dequeued { key: OWN_KEY + 1, ..read_done(128) };
        assert_eq!(wrong_key.classify(OWN_KEY), Outcome::Completed(Completion::Spurious));

        let other_overlapped = Dequeued { ours: false, ..read_done(128) };
        assert_eq!(other_overlapped.classify(OWN_KEY), Outcome::Completed(Completion::Spurious));
    }

    #[test]
    fn test_failures() {
        let our_read = Dequeued { ok: false, ..read_done(0) };
        assert_eq!(our_read.classify(OWN_KEY), Outcome::Failed);

        let wait_itself = Dequeued { ok: false, ..posted(0, WAKE_KEY) };
        assert_eq!(wait_itself.classify(OWN_KEY), Outcome::Failed);

        let someone_else = Dequeued {
            ok: false,
            ours: false,
            ..read_done(0)
        };
        assert_eq!(someone_else.classify(OWN_KEY), Outcome::Completed(Completion::Spurious));
    }
}
