//! End-to-end tests against the platform's native backend

mod common;

use anyhow::Result;
use common::{init_tracing, wait_for};
use dirwatch::{EventKind, SessionState, WatchConfig, WatchError, WatchSession};
use std::ffi::OsStr;
use std::fs;

fn channel_handler() -> (
    crossbeam_channel::Sender<dirwatch::NormalizedEvent>,
    crossbeam_channel::Receiver<dirwatch::NormalizedEvent>,
) {
    crossbeam_channel::unbounded()
}

#[tokio::test]
async fn test_open_and_close_real_directory() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (tx, _rx) = channel_handler();

    let mut session = WatchSession::open(dir.path(), tx)?;
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.is_running());

    session.close()?;
    assert_eq!(session.state(), SessionState::Stopped);
    session.close()?;
    assert!(!session.is_running());
    Ok(())
}

#[tokio::test]
async fn test_created_file_is_reported_as_rename() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (tx, rx) = channel_handler();
    let mut session = WatchSession::open(dir.path(), tx)?;

    fs::write(dir.path().join("new.txt"), "hello")?;

    let expected = session.root().join(OsStr::new("new.txt"));
    let event = wait_for(&mut session, &rx, |event| {
        event.full_path == expected && event.kind == EventKind::Rename
    })
    .await;
    assert!(event.is_some(), "no rename event for {expected}");

    session.close()?;
    Ok(())
}

#[tokio::test]
async fn test_nested_change_uses_forward_slashes() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::create_dir(dir.path().join("sub"))?;
    let (tx, rx) = channel_handler();
    let mut session = WatchSession::open(dir.path(), tx)?;

    fs::write(dir.path().join("sub").join("file.txt"), "x")?;

    let prefix = session.root().as_str().trim_end_matches('/').to_string();
    let event = wait_for(&mut session, &rx, |event| event.full_path.ends_with("sub/file.txt")).await;
    let event = event.expect("no event for the nested file");
    assert!(event.full_path.starts_with(&prefix));
    assert!(!event.full_path.contains('\\'));

    session.close()?;
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_rename_reports_old_then_new_once() -> Result<()> {
    use std::time::Duration;

    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("old.txt"), "x")?;
    let (tx, rx) = channel_handler();
    let mut session = WatchSession::open(dir.path(), tx)?;

    fs::rename(dir.path().join("old.txt"), dir.path().join("new.txt"))?;

    let old = session.root().join(OsStr::new("old.txt"));
    let new = session.root().join(OsStr::new("new.txt"));
    let mut events = Vec::new();

    // Wait for the new name, then give duplicates a chance to show up
    tokio::time::timeout(common::WAIT, async {
        while !events.iter().any(|e: &dirwatch::NormalizedEvent| e.full_path == new) {
            session.ready().await;
            session.pump();
            events.extend(rx.try_iter());
        }
    })
    .await?;
    let _ = tokio::time::timeout(Duration::from_millis(800), async {
        loop {
            session.ready().await;
            session.pump();
        }
    })
    .await;
    session.close()?;
    events.extend(rx.try_iter());

    let seen: Vec<(EventKind, String)> = events.into_iter().map(|e| (e.kind, e.full_path)).collect();
    assert_eq!(seen, vec![(EventKind::Rename, old), (EventKind::Rename, new)]);
    Ok(())
}

#[test]
fn test_non_recursive_config_opens() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (tx, _rx) = channel_handler();
    let config = WatchConfig::default().recursive(false).with_buffer_size(16 * 1024);

    let mut session = WatchSession::with_config(dir.path(), config, tx)?;
    assert!(!session.config().recursive);
    session.close()?;
    Ok(())
}

#[test]
fn test_open_missing_directory_fails() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (tx, _rx) = channel_handler();

    let err = WatchSession::open(dir.path().join("does-not-exist"), tx).unwrap_err();
    assert!(matches!(err, WatchError::Inaccessible { .. }), "{err}");
}

#[test]
fn test_open_file_fails() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("plain.txt");
    fs::write(&file, "not a directory")?;
    let (tx, _rx) = channel_handler();

    let err = WatchSession::open(&file, tx).unwrap_err();
    assert!(matches!(err, WatchError::NotADirectory(_)), "{err}");
    Ok(())
}

#[test]
fn test_open_empty_path_fails() {
    init_tracing();
    let (tx, _rx) = channel_handler();

    let err = WatchSession::open("", tx).unwrap_err();
    assert!(matches!(err, WatchError::InvalidRoot(_)), "{err}");
}

#[test]
fn test_drop_closes_session() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let (tx, rx) = channel_handler();

    let session = WatchSession::open(dir.path(), tx)?;
    drop(session);

    // The handler (and its sender) went away with the session
    assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());
    assert!(rx.is_empty());
    Ok(())
}
