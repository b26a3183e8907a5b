//! Error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`HandStore`](crate::HandStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("corrupt journal entry at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode store entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised by the [`Importer`](crate::Importer).
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to list log files: {0}")]
    Locate(#[source] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("worker pool unavailable: {0}")]
    Pool(String),

    #[error("import cancelled")]
    Cancelled,
}

impl ImportError {
    /// True for intentional shutdown, which callers usually keep quiet about.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImportError::Cancelled)
    }
}
