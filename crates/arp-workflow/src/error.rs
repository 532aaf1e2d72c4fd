//! Workflow errors

use crate::report::{RollbackOutcome, WorkflowReport};
use crate::step::WorkflowStep;
use arp_core::ErrorKind;
use arp_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("safe-mode is active; autonomous operations are halted")]
    SafeModeActive,

    #[error("target {0} already has a workflow in flight")]
    TargetBusy(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A step before execution could not complete; nothing was changed
    #[error("{step} failed: {message}")]
    StepFailed {
        step: WorkflowStep,
        kind: ErrorKind,
        message: String,
    },

    #[error("operation failed at {step}; rollback {rollback:?}")]
    OperationFailed {
        step: WorkflowStep,
        rollback: RollbackOutcome,
        report: Box<WorkflowReport>,
    },

    /// The target could not be put back; needs an operator
    #[error("rollback of {target} failed: {message}")]
    RollbackFailed {
        target: String,
        message: String,
        report: Box<WorkflowReport>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SafeModeActive | Self::RollbackFailed { .. } => ErrorKind::Fatal,
            Self::TargetBusy(_) => ErrorKind::Conflict,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::StepFailed { kind, .. } => *kind,
            Self::OperationFailed { .. } => ErrorKind::OperationFailed,
            Self::Store(e) => e.kind(),
        }
    }

    /// The run report, when execution was reached
    #[must_use]
    pub fn report(&self) -> Option<&WorkflowReport> {
        match self {
            Self::OperationFailed { report, .. } | Self::RollbackFailed { report, .. } => {
                Some(report)
            }
            _ => None,
        }
    }

    pub(crate) fn step(step: WorkflowStep, kind: ErrorKind, err: impl std::fmt::Display) -> Self {
        Self::StepFailed {
            step,
            kind,
            message: err.to_string(),
        }
    }
}
