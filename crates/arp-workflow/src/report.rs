//! What one coordinator invocation did

use crate::checkpoint::Checkpoint;
use crate::history::TargetHistory;
use crate::step::WorkflowStep;
use arp_core::{EmergencyId, PredictionId, RiskLevel};
use arp_store::Learning;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// Execution succeeded, nothing to undo
    #[default]
    NotNeeded,
    /// Target restored and re-verified against its checkpoint
    Restored,
    /// Restore or re-verification failed
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: WorkflowStep,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    pub id: PredictionId,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub session_id: String,
    pub operation: String,
    pub target: String,
    pub context: String,
    pub success: bool,
    pub prediction: Option<PredictionSummary>,
    /// Active alerts on the target when the run started
    pub active_alerts: usize,
    pub strategy: Option<String>,
    pub history: TargetHistory,
    pub learnings: Vec<Learning>,
    pub checkpoint: Option<Checkpoint>,
    pub attempts: u32,
    pub failed_step: Option<WorkflowStep>,
    pub rollback: RollbackOutcome,
    pub emergency: Option<EmergencyId>,
    pub steps: Vec<StepOutcome>,
    pub elapsed_secs: f64,
}

impl WorkflowReport {
    pub(crate) fn new(session_id: String, operation: &str, target: &str, context: &str) -> Self {
        Self {
            session_id,
            operation: operation.to_string(),
            target: target.to_string(),
            context: context.to_string(),
            success: false,
            prediction: None,
            active_alerts: 0,
            strategy: None,
            history: TargetHistory::default(),
            learnings: Vec::new(),
            checkpoint: None,
            attempts: 0,
            failed_step: None,
            rollback: RollbackOutcome::NotNeeded,
            emergency: None,
            steps: Vec::new(),
            elapsed_secs: 0.0,
        }
    }

    pub(crate) fn ok(&mut self, step: WorkflowStep) {
        self.steps.push(StepOutcome {
            step,
            ok: true,
            detail: None,
        });
    }

    pub(crate) fn note(&mut self, step: WorkflowStep, ok: bool, detail: impl Into<String>) {
        self.steps.push(StepOutcome {
            step,
            ok,
            detail: Some(detail.into()),
        });
    }

    /// How many times `step` ran
    #[must_use]
    pub fn count(&self, step: WorkflowStep) -> usize {
        self.steps.iter().filter(|s| s.step == step).count()
    }
}
