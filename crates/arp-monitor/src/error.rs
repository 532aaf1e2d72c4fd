//! Monitor errors

use arp_core::{AlertId, ErrorKind};
use arp_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("alert {0} not found")]
    NotFound(AlertId),

    #[error("invalid observation: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MonitorError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Store(e) => e.kind(),
        }
    }
}
