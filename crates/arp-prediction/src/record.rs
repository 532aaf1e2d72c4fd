//! Prediction records

use arp_core::{ChangeType, Outcome, PredictionId, RiskLevel, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source of a predicted issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    KnownPattern,
    Complexity,
    AntiPattern,
    History,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub category: String,
    pub description: String,
}

impl PredictedIssue {
    pub(crate) fn new(
        kind: IssueKind,
        severity: Severity,
        category: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            category: category.to_string(),
            description: description.into(),
        }
    }
}

/// Suggested mitigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prevention {
    pub strategy: String,
    pub action: String,
    pub priority: Severity,
}

impl Prevention {
    pub(crate) fn new(strategy: &str, action: &str, priority: Severity) -> Self {
        Self {
            strategy: strategy.to_string(),
            action: action.to_string(),
            priority,
        }
    }
}

/// One analyzed change; never deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: PredictionId,
    pub target: String,
    pub change_type: ChangeType,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub predicted_issues: Vec<PredictedIssue>,
    pub preventions: Vec<Prevention>,
    pub recommendation: String,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PredictionRecord {
    /// Whether the level bucket agreed with the observed outcome; `None` until known
    #[must_use]
    pub fn was_correct(&self) -> Option<bool> {
        self.outcome
            .map(|outcome| self.risk_level.expected_outcome() == outcome)
    }
}

/// Guidance text per level
#[must_use]
pub fn recommendation(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => {
            "STOP: Critical risk detected. Mandatory review and validation required before proceeding."
        }
        RiskLevel::High => {
            "CAUTION: High risk detected. Enhanced validation and testing strongly recommended."
        }
        RiskLevel::Medium => {
            "REVIEW: Medium risk detected. Standard validation should be sufficient."
        }
        RiskLevel::Low => "PROCEED: Low risk detected. Normal validation process applies.",
    }
}
