//! Strategy errors

use arp_core::{ErrorKind, ExperimentId};
use arp_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("no strategy available for context {context}")]
    NoStrategyAvailable { context: String },

    #[error("strategy {0} is already registered")]
    AlreadyRegistered(String),

    #[error("experiment {0} not found")]
    ExperimentNotFound(ExperimentId),

    #[error("experiment {0} is already complete")]
    ExperimentComplete(ExperimentId),

    #[error("invalid bucket {0:?}, expected base or variant")]
    InvalidBucket(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StrategyError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownStrategy(_)
            | Self::NoStrategyAvailable { .. }
            | Self::ExperimentNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyRegistered(_) => ErrorKind::Conflict,
            Self::ExperimentComplete(_) => ErrorKind::AlreadyComplete,
            Self::InvalidBucket(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Store(e) => e.kind(),
        }
    }
}
