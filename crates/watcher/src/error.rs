//! Crate-wide error type

use crate::session::SessionId;
use dirwatch_core::RootError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("invalid watch root: {0}")]
    InvalidRoot(#[from] RootError),

    #[error("watch root {path} is not accessible: {source}")]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("watch root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn watch thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("watch thread panicked")]
    WorkerPanicked,

    #[error("watch session {id} stopped unexpectedly: {source}")]
    Faulted {
        id: SessionId,
        #[source]
        source: io::Error,
    },
}

impl WatchError {
    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        WatchError::Io { op, source }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
