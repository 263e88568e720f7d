//! Consumer-side notification pump
//!
//! The watch loop never calls into application code. It queues records and
//! raises a [`ReadySignal`]; the consumer awaits that signal on its own
//! context and drains the queue, handing one [`NormalizedEvent`] at a time to
//! its [`EventHandler`].

use dirwatch_core::{ChangeQueue, NormalizedEvent, WatchRoot};
use std::sync::Arc;
use tokio::sync::Notify;

/// Receives normalized events on the consumer's context
pub trait EventHandler {
    fn handle_event(&mut self, event: NormalizedEvent);
}

impl<F> EventHandler for F
where
    F: FnMut(NormalizedEvent),
{
    fn handle_event(&mut self, event: NormalizedEvent) {
        (self)(event);
    }
}

impl EventHandler for crossbeam_channel::Sender<NormalizedEvent> {
    fn handle_event(&mut self, event: NormalizedEvent) {
        // The receiver going away just means nobody is listening anymore
        let _ = self.send(event);
    }
}

impl EventHandler for tokio::sync::mpsc::UnboundedSender<NormalizedEvent> {
    fn handle_event(&mut self, event: NormalizedEvent) {
        let _ = self.send(event);
    }
}

/// One-way "records are ready" signal from the watch thread
///
/// Signals raised while nobody waits are remembered, so the consumer cannot
/// miss one between draining and waiting again.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReadySignal(Arc<Notify>);

impl ReadySignal {
    pub(crate) fn notify(&self) {
        self.0.notify_one();
    }

    pub(crate) async fn notified(&self) {
        self.0.notified().await;
    }
}

/// Deliver every queued record to `handler`, oldest first
///
/// Each record is removed only after the handler has seen it. Returns the
/// number of events delivered.
pub(crate) fn drain<H: EventHandler + ?Sized>(
    root: &WatchRoot,
    queue: &ChangeQueue,
    handler: &mut H,
) -> usize {
    let mut delivered = 0;
    while let Some(record) = queue.peek() {
        handler.handle_event(root.normalize(&record));
        queue.pop();
        delivered += 1;
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirwatch_core::{ActionCode, ChangeRecord, EventKind};

    #[test]
    fn test_drain_delivers_in_order_with_kinds() {
        let root = WatchRoot::new(r"C:\watched").unwrap();
        let queue = ChangeQueue::new();
        queue.push(ChangeRecord::new("a", ActionCode::ADDED));
        queue.push(ChangeRecord::new(r"sub\b", ActionCode::MODIFIED));
        queue.push(ChangeRecord::new("c", ActionCode::RENAMED_OLD_NAME));
        queue.push(ChangeRecord::new("d", ActionCode(77)));

        let mut seen = Vec::new();
        let delivered = drain(&root, &queue, &mut |event: NormalizedEvent| seen.push(event));

        assert_eq!(delivered, 4);
        assert!(queue.is_empty());
        let expected = [
            ("C:/watched/a", EventKind::Rename),
            ("C:/watched/sub/b", EventKind::Change),
            ("C:/watched/c", EventKind::Rename),
            ("C:/watched/d", EventKind::Change),
        ];
        assert_eq!(seen.len(), expected.len());
        for (event, (path, kind)) in seen.iter().zip(expected) {
            assert_eq!(event.full_path, path);
            assert_eq!(event.kind, kind);
        }
    }

    #[test]
    fn test_drain_empty_queue() {
        let root = WatchRoot::new("/w").unwrap();
        let mut calls = 0;
        let delivered = drain(&root, &ChangeQueue::new(), &mut |_: NormalizedEvent| calls += 1);
        assert_eq!(delivered, 0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_channel_handler() {
        let root = WatchRoot::new("/w").unwrap();
        let queue = ChangeQueue::new();
        queue.push(ChangeRecord::new("x", ActionCode::REMOVED));

        let (mut tx, rx) = crossbeam_channel::unbounded();
        drain(&root, &queue, &mut tx);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.full_path, "/w/x");
        assert_eq!(event.kind, EventKind::Rename);
    }

    #[tokio::test]
    async fn test_signal_is_remembered() {
        let signal = ReadySignal::default();
        signal.notify();
        // Resolves immediately because the permit was stored
        tokio::time::timeout(std::time::Duration::from_secs(1), signal.notified())
            .await
            .unwrap();
    }
}
