//! In-process completion channel
//!
//! A crossbeam channel standing in for an I/O completion port. The
//! portable backend feeds it from `notify`'s event thread; hosts and tests
//! can feed it directly to drive a session with simulated completions.

use super::{Completion, PortWaker, WatchBackend};
use crossbeam_channel::{unbounded, Receiver, Sender};
use dirwatch_core::ChangeRecord;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// One completion posted to the channel
#[derive(Debug)]
pub enum Packet {
    /// Wake-up sentinel
    Wake,
    /// A completed read carrying records
    Records(Vec<ChangeRecord>),
    /// A completion unrelated to the pending read
    Spurious,
    /// A completed read whose batch was dropped
    Overflow,
    /// The pending read failed
    Fail(io::Error),
}

type Rejection = Arc<Mutex<Option<io::Error>>>;

/// Receiving end, owned by the background thread
pub struct ChannelBackend {
    /// Producer kept alive for as long as the backend (e.g. a notify watcher)
    _source: Option<Box<dyn Send>>,
    rx: Receiver<Packet>,
    rejection: Rejection,
}

/// Posting end, held by the session and by producers
#[derive(Debug, Clone)]
pub struct ChannelPort {
    tx: Sender<Packet>,
    rejection: Rejection,
}

/// Create a connected backend / port pair
pub fn channel() -> (ChannelBackend, ChannelPort) {
    let (tx, rx) = unbounded();
    let rejection = Rejection::default();
    (
        ChannelBackend {
            _source: None,
            rx,
            rejection: Arc::clone(&rejection),
        },
        ChannelPort { tx, rejection },
    )
}

impl ChannelBackend {
    /// Tie the lifetime of the packet producer to this backend
    pub fn with_source(mut self, source: impl Send + 'static) -> Self {
        self._source = Some(Box::new(source));
        self
    }
}

impl WatchBackend for ChannelBackend {
    fn arm(&mut self) -> io::Result<()> {
        match self.rejection.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn wait(&mut self, batch: &mut Vec<ChangeRecord>) -> io::Result<Completion> {
        let packet = self.rx.recv().map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "completion channel closed")
        })?;

        match packet {
            Packet::Wake => Ok(Completion::Wakeup),
            Packet::Records(records) if records.is_empty() => Ok(Completion::Spurious),
            Packet::Records(records) => {
                batch.extend(records);
                Ok(Completion::Batch)
            }
            Packet::Spurious => Ok(Completion::Spurious),
            Packet::Overflow => Ok(Completion::Overflow),
            Packet::Fail(err) => Err(err),
        }
    }
}

impl ChannelPort {
    /// Post a completion
    ///
    /// Fails once the backend has been dropped.
    pub fn post(&self, packet: Packet) -> io::Result<()> {
        self.tx
            .send(packet)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "watch backend has been released"))
    }

    /// Make the next `arm` call fail with `error`
    pub fn reject_next_arm(&self, error: io::Error) {
        *self.rejection.lock() = Some(error);
    }
}

impl PortWaker for ChannelPort {
    fn wake(&self) -> io::Result<()> {
        self.post(Packet::Wake)
    }
}
