//! Error types for cgroup operations

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

use super::types::Tid;

/// Cgroup operation errors
#[derive(Debug, Error)]
pub enum CgroupError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Line in {} does not fit in {limit} bytes (buffer too small)", path.display())]
    LineTooLong { path: PathBuf, limit: usize },

    #[error("Failed to signal task {tid}: {source}")]
    Signal {
        tid: Tid,
        #[source]
        source: Errno,
    },

    #[error("Verification failed: {expected} not found in {}", path.display())]
    Verification { path: PathBuf, expected: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to parse cgroup file: {0}")]
    Parse(String),

    #[error("Timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),
}

impl CgroupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures of the filesystem or signal layer, as opposed to
    /// verification, argument or wait failures.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::LineTooLong { .. } | Self::Signal { .. }
        )
    }

    /// The `io::ErrorKind` of an [`CgroupError::Io`], if that is what this is.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CgroupError>;
