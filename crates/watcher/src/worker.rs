//! Background watch loop
//!
//! Runs on the session's dedicated thread: arm a read, block on the
//! completion channel, queue whatever arrived, signal the consumer, repeat.
//! The only normal exit is the wake-up sentinel posted by `close`.

use crate::platform::{Completion, WatchBackend};
use crate::pump::ReadySignal;
use crate::session::SessionId;
use dirwatch_core::ChangeQueue;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, debug_span, error, trace, warn};

/// State shared between the watch thread and the session
#[derive(Debug)]
pub(crate) struct WorkerStatus {
    running: AtomicBool,
    fault: Mutex<Option<io::Error>>,
    pub(crate) queued: AtomicU64,
    pub(crate) overflows: AtomicU64,
    pub(crate) spurious: AtomicU64,
}

impl WorkerStatus {
    /// Status of a thread about to be spawned
    pub(crate) fn starting() -> Self {
        Self {
            running: AtomicBool::new(true),
            fault: Mutex::new(None),
            queued: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
            spurious: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_faulted(&self) -> bool {
        self.fault.lock().is_some()
    }

    pub(crate) fn take_fault(&self) -> Option<io::Error> {
        self.fault.lock().take()
    }

    fn record_fault(&self, err: io::Error) {
        *self.fault.lock() = Some(err);
    }

    fn mark_stopped(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Everything the watch thread owns, handed back to the session on join
pub(crate) struct WorkerContext {
    pub(crate) id: SessionId,
    pub(crate) backend: Box<dyn WatchBackend>,
    pub(crate) queue: Arc<ChangeQueue>,
    pub(crate) signal: ReadySignal,
    pub(crate) status: Arc<WorkerStatus>,
}

impl WorkerContext {
    /// Drop the thread's share of each resource: signal, backend, queue
    pub(crate) fn release(self) {
        let WorkerContext {
            backend,
            queue,
            signal,
            ..
        } = self;
        drop(signal);
        drop(backend);
        drop(queue);
    }
}

/// Thread entry point
pub(crate) fn run(mut context: WorkerContext) -> WorkerContext {
    let span = debug_span!("watch_loop", session = %context.id);
    let _guard = span.enter();

    debug!("watch loop started");
    match watch_loop(&mut context) {
        Ok(()) => debug!("watch loop stopped"),
        Err(err) => {
            error!(error = %err, "watch loop failed; no further events will be delivered");
            context.status.record_fault(err);
        }
    }

    context.status.mark_stopped();
    // Wake a consumer blocked in `ready` so it can observe the stop
    context.signal.notify();
    context
}

fn watch_loop(context: &mut WorkerContext) -> io::Result<()> {
    let mut batch = Vec::new();
    loop {
        context.backend.arm()?;

        batch.clear();
        match context.backend.wait(&mut batch)? {
            Completion::Wakeup => return Ok(()),
            Completion::Spurious => {
                context.status.spurious.fetch_add(1, Ordering::Relaxed);
                trace!("ignoring unrelated completion");
            }
            Completion::Overflow => {
                context.status.overflows.fetch_add(1, Ordering::Relaxed);
                warn!("change batch did not fit the read buffer; the OS dropped it");
            }
            Completion::Batch => {
                for record in batch.drain(..) {
                    if record.is_empty() {
                        continue;
                    }
                    trace!(path = ?record.relative_path(), action = record.action().raw(), "queued change");
                    context.queue.push(record);
                    context.status.queued.fetch_add(1, Ordering::Relaxed);
                    context.signal.notify();
                }
            }
        }
    }
}
