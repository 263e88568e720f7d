//! Platform-specific directory watch backends
//!
//! A backend owns the OS side of a session: the directory handle, the read
//! buffer and the completion channel the background thread blocks on. The
//! session talks to it through [`WatchBackend`] (on the background thread)
//! and [`PortWaker`] (from `close`, to unblock that thread).

pub mod channel;

#[cfg_attr(not(windows), allow(dead_code))]
mod dequeue;

#[cfg(windows)]
mod windows;

#[cfg(not(windows))]
mod portable;

use crate::config::WatchConfig;
use crate::error::Result;
use crate::session::SessionId;
use dirwatch_core::{ChangeRecord, WatchRoot};
use std::io;
use std::sync::Arc;

/// What a wait on the completion channel produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Zero-byte sentinel posted by `close`; the only normal exit
    Wakeup,
    /// Completion that does not belong to this session's read
    Spurious,
    /// The read completed but the OS dropped the batch (buffer too small)
    Overflow,
    /// Records were appended to the caller's batch
    Batch,
}

/// OS side of a watch, driven by the background thread
pub trait WatchBackend: Send {
    /// Make sure an asynchronous read is outstanding
    ///
    /// Idempotent while a read is pending. An error means the OS refused
    /// the request and the session cannot continue.
    fn arm(&mut self) -> io::Result<()>;

    /// Block until the completion channel delivers something
    ///
    /// Decoded records are appended to `batch`. An error means the pending
    /// read failed and the session cannot continue.
    fn wait(&mut self, batch: &mut Vec<ChangeRecord>) -> io::Result<Completion>;
}

/// Posts the wake-up sentinel to a backend's completion channel
pub trait PortWaker: Send + Sync {
    fn wake(&self) -> io::Result<()>;
}

pub(crate) type OpenedBackend = (Box<dyn WatchBackend>, Arc<dyn PortWaker>);

/// Open the platform's native backend for `root`
#[cfg(windows)]
pub(crate) fn open(root: &WatchRoot, config: &WatchConfig, id: SessionId) -> Result<OpenedBackend> {
    let (backend, port) = windows::open(root, config, id)?;
    let backend: Box<dyn WatchBackend> = Box::new(backend);
    let port: Arc<dyn PortWaker> = port;
    Ok((backend, port))
}

/// Open the platform's native backend for `root`
#[cfg(not(windows))]
pub(crate) fn open(root: &WatchRoot, config: &WatchConfig, id: SessionId) -> Result<OpenedBackend> {
    let (backend, port) = portable::open(root, config, id)?;
    let backend: Box<dyn WatchBackend> = Box::new(backend);
    let port: Arc<dyn PortWaker> = Arc::new(port);
    Ok((backend, port))
}
