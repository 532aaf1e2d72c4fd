//! Store errors

use crate::collection::Collection;
use arp_core::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

/// KnowledgeStore failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {collection}: {source}")]
    Serialize {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },

    #[error("timed out after {waited:?} waiting for the {collection} lock")]
    LockTimeout {
        collection: Collection,
        waited: Duration,
    },

    #[error("{collection} changed concurrently: expected revision {expected}, found {actual}")]
    RevisionMismatch {
        collection: Collection,
        expected: u64,
        actual: u64,
    },

    #[error("store task did not complete: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Unavailable,
            Self::Serialize { .. } | Self::Task(_) => ErrorKind::Fatal,
            Self::LockTimeout { .. } | Self::RevisionMismatch { .. } => ErrorKind::Conflict,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
