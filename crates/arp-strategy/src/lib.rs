//! ARP Strategy - outcome tracking and adaptive evolution
//!
//! - [`StrategyTracker`] keeps per-context success and time aggregates and
//!   ranks strategies by success rate per second once they have enough samples
//! - [`StrategyEvolution`] mutates a strategy, runs the variant against its
//!   parent in an A/B experiment and promotes clear winners into the registry

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod evolution;
pub mod model;
pub mod mutation;
pub mod tracker;

pub use error::StrategyError;
pub use evolution::{
    Bucket, BucketResults, Buckets, EvolutionHistory, EvolutionState, Experiment,
    ExperimentReport, ExperimentState, Promotion, Scores, StrategyEvolution, Trial,
};
pub use model::{
    default_strategies, Adaptation, ContextStats, Execution, Lineage, Strategy, StrategyRegistry,
};
pub use mutation::{Mutation, MutationKind};
pub use tracker::{Basis, Performance, Recommendation, StrategyTracker, Trend};
