//! FailurePredictionEngine

use crate::error::PredictionError;
use crate::record::{recommendation, IssueKind, PredictedIssue, PredictionRecord, Prevention};
use crate::signals::{
    anti_patterns, is_critical_path, known_patterns, FsInspector, TargetInspector, TargetKind,
    TargetProfile,
};
use arp_core::{ChangeType, Outcome, PredictionConfig, PredictionId, RiskLevel, Severity};
use arp_store::{Collection, KnowledgeBase, KnowledgeStore};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Contents of the `predictions` collection
pub type PredictionLog = Vec<PredictionRecord>;

/// Effect of an outcome update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum OutcomeChange {
    /// First outcome for this record
    Recorded,
    /// Same outcome as already stored
    Unchanged,
    /// Different outcome replaced an earlier one
    Corrected { previous: Outcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub total_predictions: usize,
    pub verified_predictions: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub accuracy_rate: f64,
}

/// Base risk by change type
#[must_use]
pub fn change_weight(change: ChangeType) -> f64 {
    match change {
        ChangeType::Deletion => 0.45,
        ChangeType::Modification => 0.4,
        ChangeType::Addition => 0.3,
    }
}

#[derive(Clone)]
pub struct FailurePredictionEngine {
    store: Arc<KnowledgeStore>,
    config: PredictionConfig,
    inspector: Arc<dyn TargetInspector>,
}

impl FailurePredictionEngine {
    /// Engine reading targets relative to the working directory
    #[must_use]
    pub fn new(store: Arc<KnowledgeStore>, config: PredictionConfig) -> Self {
        Self {
            store,
            config,
            inspector: Arc::new(FsInspector::default()),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_inspector(mut self, inspector: Arc<dyn TargetInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Score a proposed change and append the record
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty target, or a store error
    pub fn analyze(
        &self,
        target: &str,
        change: ChangeType,
    ) -> Result<PredictionRecord, PredictionError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(PredictionError::InvalidInput("target must not be empty".into()));
        }

        let knowledge = self
            .store
            .get::<KnowledgeBase>(Collection::Knowledge)?
            .data;
        let prior = self.store.get::<PredictionLog>(Collection::Predictions)?.data;
        let content = self.inspector.inspect(target);

        let kind = TargetKind::of(target);
        let mut risk = change_weight(change) + kind.weight();
        if is_critical_path(target) {
            risk += 0.1;
        }

        let mut issues = Vec::new();
        let mut oversized = false;
        if let Some(content) = content.as_deref() {
            let profile = TargetProfile::from_content(content);
            debug!(target, ?profile, "target profiled");
            oversized = profile.lines > self.config.line_threshold;
            risk += profile.weight(self.config.line_threshold);
            issues.extend(known_patterns(&knowledge.error_patterns, content));
            issues.extend(profile.complexity_issues(self.config.line_threshold));
            let anti = anti_patterns(kind, content);
            risk += (0.05 * anti.len() as f64).min(0.15);
            issues.extend(anti);
        }
        let matched_patterns = issues
            .iter()
            .filter(|i| i.kind == IssueKind::KnownPattern)
            .count();
        risk += (0.1 * matched_patterns as f64).min(0.2);

        if let Some((failures, verified)) = failure_history(&prior, target) {
            risk += self.config.history_weight * failures as f64 / verified as f64;
            if failures > 0 {
                issues.push(PredictedIssue::new(
                    IssueKind::History,
                    if failures * 2 > verified { Severity::High } else { Severity::Medium },
                    "history",
                    format!("Target failed {failures} of {verified} previously verified changes"),
                ));
            }
        }

        let risk_score = round3(risk.clamp(0.0, 1.0));
        let risk_level = RiskLevel::from_score(risk_score);
        let record = PredictionRecord {
            id: PredictionId::new(),
            target: target.to_string(),
            change_type: change,
            risk_score,
            risk_level,
            preventions: preventions(&issues, risk_score, oversized),
            predicted_issues: issues,
            recommendation: recommendation(risk_level).to_string(),
            outcome: None,
            created_at: Utc::now(),
            resolved_at: None,
        };

        let stored = record.clone();
        self.store
            .update(Collection::Predictions, |log: &mut PredictionLog| {
                log.push(stored);
                Ok::<_, PredictionError>(())
            })?;

        info!(
            id = %record.id,
            target,
            change = %change,
            score = record.risk_score,
            level = %record.risk_level,
            "prediction recorded"
        );
        Ok(record)
    }

    /// Attach the real outcome to a prediction
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids, or a store error
    pub fn update(
        &self,
        id: PredictionId,
        outcome: Outcome,
    ) -> Result<OutcomeChange, PredictionError> {
        // repeating the recorded outcome leaves the file untouched
        if self.get(id)?.outcome == Some(outcome) {
            return Ok(OutcomeChange::Unchanged);
        }
        self.store
            .update(Collection::Predictions, |log: &mut PredictionLog| {
                let record = log
                    .iter_mut()
                    .find(|r| r.id == id)
                    .ok_or(PredictionError::NotFound(id))?;
                let change = match record.outcome {
                    None => OutcomeChange::Recorded,
                    Some(previous) if previous == outcome => return Ok(OutcomeChange::Unchanged),
                    Some(previous) => {
                        warn!(
                            id = %id,
                            previous = %previous,
                            corrected = %outcome,
                            "prediction outcome corrected"
                        );
                        OutcomeChange::Corrected { previous }
                    }
                };
                record.outcome = Some(outcome);
                record.resolved_at = Some(Utc::now());
                debug!(id = %id, outcome = %outcome, "prediction outcome recorded");
                Ok(change)
            })
    }

    /// Look up one record
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids
    pub fn get(&self, id: PredictionId) -> Result<PredictionRecord, PredictionError> {
        self.store
            .get::<PredictionLog>(Collection::Predictions)?
            .data
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(PredictionError::NotFound(id))
    }

    /// Correct / verified; 0 when nothing is verified
    ///
    /// # Errors
    /// Returns a store error if predictions cannot be read
    pub fn accuracy(&self) -> Result<f64, PredictionError> {
        Ok(self.accuracy_report()?.accuracy_rate)
    }

    /// # Errors
    /// Returns a store error if predictions cannot be read
    pub fn accuracy_report(&self) -> Result<AccuracyReport, PredictionError> {
        let log = self.store.get::<PredictionLog>(Collection::Predictions)?.data;
        Ok(accuracy_of(&log))
    }
}

impl std::fmt::Debug for FailurePredictionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailurePredictionEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Accuracy over a set of records
#[must_use]
pub fn accuracy_of(records: &[PredictionRecord]) -> AccuracyReport {
    let (correct, incorrect) = records
        .iter()
        .filter_map(PredictionRecord::was_correct)
        .fold((0, 0), |(c, i), ok| if ok { (c + 1, i) } else { (c, i + 1) });
    let verified = correct + incorrect;
    AccuracyReport {
        total_predictions: records.len(),
        verified_predictions: verified,
        correct,
        incorrect,
        accuracy_rate: if verified == 0 {
            0.0
        } else {
            correct as f64 / verified as f64
        },
    }
}

/// (failures, verified) among earlier predictions for `target`
fn failure_history(prior: &[PredictionRecord], target: &str) -> Option<(usize, usize)> {
    let outcomes = prior
        .iter()
        .filter(|r| r.target == target)
        .filter_map(|r| r.outcome);
    let (failures, verified) = outcomes.fold((0, 0), |(f, v), o| {
        (f + usize::from(!o.is_success()), v + 1)
    });
    (verified > 0).then_some((failures, verified))
}

fn preventions(issues: &[PredictedIssue], score: f64, oversized: bool) -> Vec<Prevention> {
    let has = |kind| issues.iter().any(|i| i.kind == kind);
    let mut out = Vec::new();
    if has(IssueKind::KnownPattern) {
        out.push(Prevention::new(
            "pre_validation",
            "Run validation checks before committing",
            Severity::High,
        ));
    }
    if has(IssueKind::Complexity) {
        out.push(Prevention::new(
            "refactoring",
            "Consider refactoring to reduce complexity",
            Severity::Medium,
        ));
    }
    if issues
        .iter()
        .any(|i| i.kind == IssueKind::AntiPattern && i.severity >= Severity::High)
    {
        out.push(Prevention::new(
            "code_review",
            "Mandatory code review before deployment",
            Severity::Critical,
        ));
    }
    if score > 0.7 {
        out.push(Prevention::new(
            "enhanced_monitoring",
            "Enable enhanced monitoring for this change",
            Severity::High,
        ));
    }
    if oversized || score > 0.5 {
        out.push(Prevention::new(
            "comprehensive_testing",
            "Run full test suite including integration tests",
            Severity::High,
        ));
    }
    out
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
