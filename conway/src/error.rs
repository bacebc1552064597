// error.rs - Error kinds for the evolution engine and its collaborators

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LifeError>;

/// Every failure is fatal to the run; nothing here is retried.
#[derive(Error, Debug)]
pub enum LifeError {
    /// Bad grid size, worker count or strategy selector. Detected before any work starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A grid, scratch buffer or ghost row could not be allocated.
    #[error("Allocation of {what} ({bytes} bytes) failed")]
    Allocation { what: &'static str, bytes: usize },

    /// A halo or gather message was lost, late, or out of sequence.
    #[error("Communication failure on rank {rank}: {reason}")]
    Communication { rank: usize, reason: String },

    /// A snapshot file could not be read or written.
    #[error("Snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifeError {
    pub fn config(message: impl Into<String>) -> Self {
        LifeError::Configuration(message.into())
    }

    pub fn comm(rank: usize, reason: impl Into<String>) -> Self {
        LifeError::Communication {
            rank,
            reason: reason.into(),
        }
    }
}

/// Reasons a PGM snapshot is rejected. Each one is distinct from a valid (even empty) grid.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported magic number {0:?}, expected \"P5\"")]
    BadMagic(String),

    #[error("unparsable header: {0}")]
    BadHeader(String),

    #[error("image is {width}x{height}, a playground must be square")]
    NotSquare { width: usize, height: usize },

    #[error("pixel data truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("not enough memory for {bytes} bytes of pixel data")]
    OutOfMemory { bytes: usize },
}
