//! Common utilities for integration tests

#![allow(dead_code)]

use dirwatch::{NormalizedEvent, WatchSession};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Upper bound for anything that waits on the OS
pub const WAIT: Duration = Duration::from_secs(10);

/// Route `tracing` output to the test harness
///
/// Filtered by `DIRWATCH_LOG` (e.g. `DIRWATCH_LOG=dirwatch=trace`), silent
/// by default. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("DIRWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Pump `session` until `accept` has seen a matching event
pub async fn wait_for<H, F>(
    session: &mut WatchSession<H>,
    events: &crossbeam_channel::Receiver<NormalizedEvent>,
    mut accept: F,
) -> Option<NormalizedEvent>
where
    H: dirwatch::EventHandler,
    F: FnMut(&NormalizedEvent) -> bool,
{
    let search = async {
        loop {
            session.ready().await;
            session.pump();
            if let Some(found) = events.try_iter().find(|event| accept(event)) {
                return Some(found);
            }
            if !session.is_running() {
                return None;
            }
        }
    };
    tokio::time::timeout(WAIT, search).await.ok().flatten()
}
