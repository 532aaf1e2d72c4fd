//! ARP Prediction - failure risk scoring before a change runs
//!
//! [`FailurePredictionEngine::analyze`] combines weighted signals into a
//! score in `[0, 1]`:
//! - change type (deletion > modification > addition)
//! - target size, nesting depth and function count
//! - file kind, critical-path names and anti-patterns
//! - known error patterns from the knowledge base
//! - the failure rate of earlier predictions for the same target
//!
//! Records are appended to the `predictions` collection and later resolved
//! with [`FailurePredictionEngine::update`] so [`FailurePredictionEngine::accuracy`]
//! can measure how well the buckets track reality.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod engine;
pub mod error;
pub mod record;
pub mod signals;

pub use engine::{AccuracyReport, FailurePredictionEngine, OutcomeChange};
pub use error::PredictionError;
pub use record::{IssueKind, PredictedIssue, PredictionRecord, Prevention};
pub use signals::{compile_pattern, FsInspector, TargetInspector, TargetKind, TargetProfile};
