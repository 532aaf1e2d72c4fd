//! Run history in the `history` collection

use crate::report::RollbackOutcome;
use crate::step::WorkflowStep;
use arp_core::{EmergencyId, PredictionId, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runs retained in the collection
pub const HISTORY_CAP: usize = 1000;

/// One coordinator invocation that reached execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub session_id: String,
    pub operation: String,
    pub target: String,
    pub context: String,
    #[serde(default)]
    pub strategy: Option<String>,
    pub prediction: PredictionId,
    pub risk_level: RiskLevel,
    pub success: bool,
    pub attempts: u32,
    #[serde(default)]
    pub failed_step: Option<WorkflowStep>,
    pub rollback: RollbackOutcome,
    #[serde(default)]
    pub emergency: Option<EmergencyId>,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

/// Contents of the `history` collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowHistory {
    pub runs: Vec<RunRecord>,
}

impl WorkflowHistory {
    pub(crate) fn push(&mut self, run: RunRecord) {
        self.runs.push(run);
        if self.runs.len() > HISTORY_CAP {
            let excess = self.runs.len() - HISTORY_CAP;
            self.runs.drain(..excess);
        }
    }

    /// Prior runs and failures on `target`
    #[must_use]
    pub fn summary_for(&self, target: &str) -> TargetHistory {
        let mut summary = TargetHistory::default();
        for run in self.runs.iter().filter(|r| r.target == target) {
            summary.runs += 1;
            if !run.success {
                summary.failures += 1;
            }
        }
        summary.last_success = self
            .runs
            .iter()
            .rev()
            .find(|r| r.target == target)
            .map(|r| r.success);
        summary
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetHistory {
    pub runs: usize,
    pub failures: usize,
    pub last_success: Option<bool>,
}
