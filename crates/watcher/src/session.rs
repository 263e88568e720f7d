//! Watch session: startup, consumer API and shutdown

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::platform::{self, PortWaker, WatchBackend};
use crate::pump::{self, EventHandler, ReadySignal};
use crate::worker::{self, WorkerContext, WorkerStatus};
use dirwatch_core::{ChangeQueue, WatchRoot};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier
///
/// Doubles as the completion key the session's reads are tagged with.
/// Never zero; zero is the key of the wake-up sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg_attr(not(windows), allow(dead_code))]
    pub(crate) fn key(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Running,
    ShuttingDown,
    Stopped,
}

/// Counters since the session started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Records pushed onto the queue by the watch loop
    pub queued: u64,
    /// Events handed to the handler
    pub delivered: u64,
    /// Batches the OS dropped because they did not fit the buffer
    pub overflows: u64,
    /// Completions that did not belong to this session's read
    pub spurious: u64,
}

/// Resources that exist only while the watch thread does
struct ActiveWatch {
    signal: ReadySignal,
    waker: Arc<dyn PortWaker>,
    worker: JoinHandle<WorkerContext>,
    queue: Arc<ChangeQueue>,
}

/// A running watch over one directory subtree
///
/// Events are queued by a background thread and delivered to the handler
/// only from [`pump`](Self::pump) (directly or through
/// [`run`](Self::run)), i.e. on the consumer's own context. Since `pump`,
/// `run` and `close` all take `&mut self`, the handler can never run
/// concurrently with shutdown nor after `close` has returned.
pub struct WatchSession<H: EventHandler> {
    id: SessionId,
    root: WatchRoot,
    config: WatchConfig,
    state: SessionState,
    active: Option<ActiveWatch>,
    status: Arc<WorkerStatus>,
    delivered: u64,
    handler: H,
}

impl<H: EventHandler> WatchSession<H> {
    /// Watch `root` with the default configuration
    pub fn open(root: impl AsRef<Path>, handler: H) -> Result<Self> {
        Self::with_config(root, WatchConfig::default(), handler)
    }

    /// Watch `root` with the platform's native backend
    pub fn with_config(root: impl AsRef<Path>, config: WatchConfig, handler: H) -> Result<Self> {
        let root = prepare_root(root.as_ref(), &config)?;
        let id = SessionId::next();
        let queue = Arc::new(ChangeQueue::new());
        let (backend, waker) = platform::open(&root, &config, id)?;
        Self::launch(id, root, config, queue, backend, waker, handler)
    }

    /// Watch `root` through a caller-provided backend
    ///
    /// `waker` must unblock `backend.wait` with a wake-up completion.
    pub fn with_backend(
        root: impl AsRef<Path>,
        config: WatchConfig,
        backend: Box<dyn WatchBackend>,
        waker: Arc<dyn PortWaker>,
        handler: H,
    ) -> Result<Self> {
        let root = prepare_root(root.as_ref(), &config)?;
        let id = SessionId::next();
        let queue = Arc::new(ChangeQueue::new());
        Self::launch(id, root, config, queue, backend, waker, handler)
    }

    fn launch(
        id: SessionId,
        root: WatchRoot,
        config: WatchConfig,
        queue: Arc<ChangeQueue>,
        backend: Box<dyn WatchBackend>,
        waker: Arc<dyn PortWaker>,
        handler: H,
    ) -> Result<Self> {
        let status = Arc::new(WorkerStatus::starting());
        let signal = ReadySignal::default();

        let mut session = Self {
            id,
            root,
            config,
            state: SessionState::Uninitialized,
            active: None,
            status: Arc::clone(&status),
            delivered: 0,
            handler,
        };

        let context = WorkerContext {
            id,
            backend,
            queue: Arc::clone(&queue),
            signal: signal.clone(),
            status,
        };
        // On failure the closure, and the backend inside it, is dropped here
        let worker = thread::Builder::new()
            .name(format!("dirwatch-{id}"))
            .spawn(move || worker::run(context))
            .map_err(WatchError::Spawn)?;

        session.active = Some(ActiveWatch {
            signal,
            waker,
            worker,
            queue,
        });
        session.state = SessionState::Running;
        debug!(session = %id, root = %session.root.as_str(), "watch session running");
        Ok(session)
    }

    /// Deliver every queued event to the handler
    ///
    /// Returns the number of events delivered; always 0 once closed.
    pub fn pump(&mut self) -> usize {
        let Some(active) = &self.active else {
            return 0;
        };
        let delivered = pump::drain(&self.root, &active.queue, &mut self.handler);
        self.delivered += delivered as u64;
        delivered
    }

    /// Wait until the watch loop has queued something or stopped
    ///
    /// Returns immediately when the session is closed or the loop is gone.
    pub async fn ready(&self) {
        let Some(active) = &self.active else {
            return;
        };
        if !self.status.is_running() {
            return;
        }
        active.signal.notified().await;
    }

    /// Pump events as they arrive until the watch loop stops
    ///
    /// The loop only stops on its own after a fault, so this is normally
    /// raced against the host's shutdown trigger:
    ///
    /// ```no_run
    /// # async fn demo(mut session: dirwatch::WatchSession<fn(dirwatch::NormalizedEvent)>) {
    /// tokio::select! {
    ///     _ = session.run() => {}
    ///     _ = tokio::time::sleep(std::time::Duration::from_secs(60)) => {}
    /// }
    /// session.close().ok();
    /// # }
    /// ```
    pub async fn run(&mut self) {
        while self.is_running() {
            self.ready().await;
            self.pump();
        }
        self.pump();
    }

    /// Stop watching and release every resource
    ///
    /// Idempotent. Posts the wake-up sentinel, joins the watch thread, then
    /// releases the ready signal, the completion channel, the directory
    /// handle and read buffer, and finally the queue. Returns
    /// [`WatchError::Faulted`] once if the watch loop had died on its own;
    /// resources are released either way.
    pub fn close(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        if self.config.flush_on_close {
            let flushed = pump::drain(&self.root, &active.queue, &mut self.handler);
            self.delivered += flushed as u64;
        }

        self.state = SessionState::ShuttingDown;
        debug!(session = %self.id, "shutting down watch session");

        let ActiveWatch {
            signal,
            waker,
            worker,
            queue,
        } = active;

        if let Err(err) = waker.wake() {
            // Only possible once the loop has already exited
            warn!(session = %self.id, error = %err, "failed to post wake-up");
        }
        let joined = worker.join();

        drop(signal);
        drop(waker);
        let result = match joined {
            Ok(context) => {
                context.release();
                Ok(())
            }
            Err(_) => Err(WatchError::WorkerPanicked),
        };

        let discarded = queue.len();
        if discarded > 0 {
            debug!(session = %self.id, discarded, "discarding undelivered changes");
        }
        drop(queue);

        self.state = SessionState::Stopped;
        debug!(session = %self.id, "watch session stopped");

        result?;
        match self.status.take_fault() {
            Some(source) => Err(WatchError::Faulted {
                id: self.id,
                source,
            }),
            None => Ok(()),
        }
    }

    /// Identifier of this session, also its completion key
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The directory being watched
    pub fn root(&self) -> &WatchRoot {
        &self.root
    }

    /// Configuration the session was opened with
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the watch loop is still delivering changes
    pub fn is_running(&self) -> bool {
        self.active.is_some() && self.status.is_running()
    }

    /// Whether the watch loop stopped because of an OS failure
    pub fn is_faulted(&self) -> bool {
        self.status.is_faulted()
    }

    /// Number of queued, not yet delivered records
    pub fn pending(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.queue.len())
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> WatchStats {
        WatchStats {
            queued: self.status.queued.load(Ordering::Relaxed),
            delivered: self.delivered,
            overflows: self.status.overflows.load(Ordering::Relaxed),
            spurious: self.status.spurious.load(Ordering::Relaxed),
        }
    }

    /// The handler events are delivered to
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable access to the handler between pumps
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<H: EventHandler> Drop for WatchSession<H> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(session = %self.id, error = %err, "watch session closed with an error");
        }
    }
}

impl<H: EventHandler> fmt::Debug for WatchSession<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("id", &self.id)
            .field("root", &self.root.as_str())
            .field("state", &self.state)
            .field("pending", &self.pending())
            .finish()
    }
}

fn prepare_root(path: &Path, config: &WatchConfig) -> Result<WatchRoot> {
    config.validate()?;
    let root = WatchRoot::new(path)?;

    let metadata = std::fs::metadata(root.as_path()).map_err(|source| WatchError::Inaccessible {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(WatchError::NotADirectory(path.to_path_buf()));
    }
    Ok(root)
}
