//! Recovery actions performed on each escalation level

use crate::ladder::EscalationLevel;
use crate::record::{ActionReport, Emergency};
use async_trait::async_trait;
use tracing::{info, warn};

/// Performs the actions of a level
///
/// A report with `resolved = true` resolves the emergency on the spot.
/// Safe-mode itself is switched on by the response system, not here.
#[async_trait]
pub trait RecoveryActions: Send + Sync {
    async fn perform(&self, emergency: &Emergency, level: EscalationLevel) -> ActionReport;
}

/// Records each action in the log and never resolves
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggedActions;

#[async_trait]
impl RecoveryActions for LoggedActions {
    async fn perform(&self, emergency: &Emergency, level: EscalationLevel) -> ActionReport {
        for action in level.actions() {
            if level.reaches_human() {
                warn!(emergency = %emergency.id, level = level.number(), action, "{}", emergency.description);
            } else {
                info!(emergency = %emergency.id, level = level.number(), action, "recovery action");
            }
        }
        ActionReport {
            performed: level.actions().iter().map(|a| (*a).to_string()).collect(),
            resolved: false,
            note: None,
        }
    }
}
