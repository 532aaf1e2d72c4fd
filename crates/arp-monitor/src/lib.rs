//! ARP Monitor - proactive health monitoring
//!
//! Each (monitor type, target) pair moves through
//! `Normal -> Breached -> Resolved`:
//! - observations arrive through [`ProactiveMonitor::record`]
//! - [`ProactiveMonitor::run`] raises at most one active alert per pair
//! - returning within bounds does not resolve; [`ProactiveMonitor::resolve`] does
//! - [`ProactiveMonitor::watch`] repeats `run` on the scheduler until shut down

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod metric;
pub mod monitor;

pub use error::MonitorError;
pub use metric::{Alert, AlertStatus, MonitorMetric, MonitorState, MonitorType};
pub use monitor::{MonitorStatus, ProactiveMonitor, RunReport};
