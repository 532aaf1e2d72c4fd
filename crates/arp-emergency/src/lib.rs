//! ARP Emergency - tiered escalation with safe-mode
//!
//! An emergency is declared at level 0 and climbs the ladder one level at a
//! time when `handle` is called and each level's deadline passes unresolved:
//! 1. Agent Auto-Fix (120s)
//! 2. Alternative Strategy (300s)
//! 3. Cross-Agent Consultation (600s)
//! 4. Human Notification (900s)
//! 5. System Safe-Mode, cleared only by an operator
//!
//! Deadlines live in the `emergencies` collection and are armed on the shared
//! [`arp_core::Scheduler`], one timer per emergency.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod actions;
pub mod classify;
pub mod error;
pub mod ladder;
pub mod record;
pub mod system;

pub use actions::{LoggedActions, RecoveryActions};
pub use classify::{classify, classify_assisted, Classification, ClassificationSource};
pub use error::EmergencyError;
pub use ladder::EscalationLevel;
pub use record::{
    ActionReport, Emergency, EmergencyFilter, EmergencyState, EmergencyStatus, LevelEntry,
    Resolution, SafeModeState,
};
pub use system::{timer_key, EmergencyResponseSystem};
