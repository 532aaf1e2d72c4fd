//! Emergency errors

use arp_core::{EmergencyId, ErrorKind};
use arp_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EmergencyError {
    #[error("emergency {0} not found")]
    NotFound(EmergencyId),

    #[error("emergency {0} is already resolved")]
    AlreadyResolved(EmergencyId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EmergencyError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyResolved(_) => ErrorKind::AlreadyComplete,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Store(e) => e.kind(),
        }
    }
}
