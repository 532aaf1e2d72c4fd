//! Prediction errors

use arp_core::{ErrorKind, PredictionId};
use arp_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("prediction {0} not found")]
    NotFound(PredictionId),

    #[error("invalid prediction input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PredictionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Store(e) => e.kind(),
        }
    }
}
