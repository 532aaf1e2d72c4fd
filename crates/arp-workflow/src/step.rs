//! The fixed coordinator sequence

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Predict = 1,
    ReadAlerts = 2,
    SelectStrategy = 3,
    LoadHistory = 4,
    QueryKnowledge = 5,
    Checkpoint = 6,
    Execute = 7,
    Validate = 8,
    Rollback = 9,
    Reverify = 10,
    RecordStrategy = 11,
    UpdatePrediction = 12,
    PersistHistory = 13,
    SyncLearnings = 14,
    ResolveEmergency = 15,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 15] = [
        Self::Predict,
        Self::ReadAlerts,
        Self::SelectStrategy,
        Self::LoadHistory,
        Self::QueryKnowledge,
        Self::Checkpoint,
        Self::Execute,
        Self::Validate,
        Self::Rollback,
        Self::Reverify,
        Self::RecordStrategy,
        Self::UpdatePrediction,
        Self::PersistHistory,
        Self::SyncLearnings,
        Self::ResolveEmergency,
    ];

    #[inline]
    #[must_use]
    pub fn number(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Predict => "predict",
            Self::ReadAlerts => "read_alerts",
            Self::SelectStrategy => "select_strategy",
            Self::LoadHistory => "load_history",
            Self::QueryKnowledge => "query_knowledge",
            Self::Checkpoint => "checkpoint",
            Self::Execute => "execute",
            Self::Validate => "validate",
            Self::Rollback => "rollback",
            Self::Reverify => "reverify",
            Self::RecordStrategy => "record_strategy",
            Self::UpdatePrediction => "update_prediction",
            Self::PersistHistory => "persist_history",
            Self::SyncLearnings => "sync_learnings",
            Self::ResolveEmergency => "resolve_emergency",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.as_str())
    }
}
