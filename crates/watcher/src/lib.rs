//! Directory watching for dirwatch
//!
//! This crate watches one directory subtree and delivers its changes to a
//! consumer as `(full_path, kind)` pairs:
//! - Overlapped directory reads on a dedicated background thread
//! - Unbounded FIFO hand-off between that thread and the consumer
//! - Delivery only on the consumer's own context, via [`WatchSession::pump`]
//! - Idempotent shutdown that releases every OS resource
//!
//! ```no_run
//! use dirwatch::{NormalizedEvent, WatchSession};
//!
//! # async fn demo() -> dirwatch::Result<()> {
//! let mut session = WatchSession::open("C:/projects/site", |event: NormalizedEvent| {
//!     println!("{} {}", event.kind, event.full_path);
//! })?;
//!
//! tokio::select! {
//!     _ = session.run() => {}
//!     _ = tokio::time::sleep(std::time::Duration::from_secs(300)) => {}
//! }
//! session.close()
//! # }
//! ```

pub mod config;
pub mod error;
pub mod platform;
pub mod pump;
pub mod session;
mod worker;

pub use config::{ChangeFilter, WatchConfig};
pub use error::{Result, WatchError};
pub use platform::channel::{channel, ChannelBackend, ChannelPort, Packet};
pub use platform::{Completion, PortWaker, WatchBackend};
pub use pump::EventHandler;
pub use session::{SessionId, SessionState, WatchStats, WatchSession};

pub use dirwatch_core::{ActionCode, ChangeRecord, EventKind, NormalizedEvent, WatchRoot};
