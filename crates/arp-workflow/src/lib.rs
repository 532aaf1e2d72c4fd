//! ARP Workflow - the coordinator that wraps one external operation
//!
//! [`WorkflowCoordinator::execute`] predicts risk, reads alerts, picks a
//! strategy, checkpoints the target, runs the operation through an
//! [`OperationExecutor`] and recovers on failure: an emergency is declared
//! and handled, the target is restored from its checkpoint, and the run is
//! retried a bounded number of times. Strategy statistics, the prediction
//! outcome and run history are written once per run that reached execution.
//!
//! # Example
//!
//! ```rust,ignore
//! use arp_workflow::{CommandExecutor, WorkflowCoordinator};
//!
//! let coordinator = WorkflowCoordinator::new(store, &config, scheduler);
//! let executor = CommandExecutor::new("cargo", vec!["build".into()]);
//! let report = coordinator
//!     .execute("modify", "src/lib.rs", "build_error", &executor)
//!     .await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod checkpoint;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod knowledge;
pub mod operation;
pub mod report;
pub mod step;

pub use checkpoint::{digest, Checkpoint, CheckpointError, CheckpointProvider, FileCheckpoints};
pub use coordinator::WorkflowCoordinator;
pub use error::WorkflowError;
pub use history::{RunRecord, TargetHistory, WorkflowHistory, HISTORY_CAP};
pub use operation::{
    CommandExecutor, OperationExecutor, OperationRequest, OperationResult, ResultValidator, TrustExecutor,
};
pub use report::{PredictionSummary, RollbackOutcome, StepOutcome, WorkflowReport};
pub use step::WorkflowStep;
