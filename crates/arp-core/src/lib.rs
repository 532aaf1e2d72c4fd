//! ARP Core - shared vocabulary for the Autonomous Reliability Pipeline
//!
//! Every pipeline crate depends on this one for:
//! - Identifier newtypes (ULID-backed, sortable)
//! - Severity, risk level, change type and outcome enums
//! - The error kind taxonomy all crate errors map onto
//! - Layered configuration (defaults, TOML, environment)
//! - The timer scheduler that owns every background loop
//! - The optional inference capability and its rule-based fallback
//!
//! # Example
//!
//! ```rust,ignore
//! use arp_core::{PipelineConfig, Scheduler};
//! use std::path::Path;
//!
//! let config = PipelineConfig::load(None, Path::new(".arp"))?;
//! let scheduler = Scheduler::new();
//! scheduler.schedule_every("monitor", config.monitor.interval(), || async {
//!     // one evaluation pass
//! });
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod inference;
pub mod scheduler;
pub mod types;

pub use config::{
    ConfigError, CONFIG_FILE_NAME, EmergencyConfig, MonitorConfig, PipelineConfig, PredictionConfig, StoreConfig,
    StrategyConfig, WorkflowConfig,
};
pub use error::ErrorKind;
pub use inference::{
    from_config as inference_from_config, InferenceBackend, InferenceError, OllamaBackend, RuleBasedBackend, SharedInference,
};
pub use scheduler::{Scheduler, TimerKey};
pub use types::{
    AlertId, ChangeType, EmergencyId, ExperimentId, Outcome, ParseEnumError, PredictionId,
    RiskLevel, Severity,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
