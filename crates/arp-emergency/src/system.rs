//! EmergencyResponseSystem

use crate::actions::{LoggedActions, RecoveryActions};
use crate::classify::{self, Classification};
use crate::error::EmergencyError;
use crate::ladder::EscalationLevel;
use crate::record::{
    ActionReport, Emergency, EmergencyFilter, EmergencyState, EmergencyStatus, LevelEntry,
    Resolution, SafeModeState,
};
use arp_core::{
    EmergencyConfig, EmergencyId, RuleBasedBackend, Scheduler, Severity, SharedInference, TimerKey,
};
use arp_store::{blocking, Collection, KnowledgeStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Scheduler key of an emergency's level deadline
#[must_use]
pub fn timer_key(id: EmergencyId) -> TimerKey {
    TimerKey::new(format!("emergency.{id}"))
}

pub struct EmergencyResponseSystem {
    store: Arc<KnowledgeStore>,
    config: EmergencyConfig,
    scheduler: Scheduler,
    actions: Arc<dyn RecoveryActions>,
    inference: SharedInference,
}

impl EmergencyResponseSystem {
    #[must_use]
    pub fn new(store: Arc<KnowledgeStore>, config: EmergencyConfig, scheduler: Scheduler) -> Self {
        Self {
            store,
            config,
            scheduler,
            actions: Arc::new(LoggedActions),
            inference: Arc::new(RuleBasedBackend),
        }
    }

    #[must_use]
    pub fn with_actions(mut self, actions: Arc<dyn RecoveryActions>) -> Self {
        self.actions = actions;
        self
    }

    #[must_use]
    pub fn with_inference(mut self, inference: SharedInference) -> Self {
        self.inference = inference;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EmergencyConfig {
        &self.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn classify(&self, message: &str) -> Severity {
        classify::classify(message)
    }

    /// Classification through the inference backend when it is reachable
    pub async fn classify_assisted(&self, message: &str) -> Classification {
        classify::classify_assisted(&self.inference, message).await
    }

    /// Record a new emergency at level 0
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty description
    pub fn declare(
        &self,
        description: &str,
        severity: Severity,
        context: serde_json::Value,
    ) -> Result<Emergency, EmergencyError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(EmergencyError::InvalidInput("description must not be empty".into()));
        }
        let emergency = Emergency {
            id: EmergencyId::new(),
            description: description.to_string(),
            severity,
            context,
            status: EmergencyStatus::Active,
            current_level: 0,
            escalation_history: Vec::new(),
            deadline: None,
            resolution: None,
            declared_at: Utc::now(),
        };
        self.store
            .update(Collection::Emergencies, |state: &mut EmergencyState| {
                state.emergencies.push(emergency.clone());
                Ok::<_, EmergencyError>(())
            })?;
        warn!(emergency = %emergency.id, %severity, "emergency declared: {description}");
        Ok(emergency)
    }

    /// Enter the ladder, or catch up on levels whose deadlines passed
    ///
    /// Overdue levels are entered one at a time, each from the previous
    /// deadline. The next deadline is armed on the scheduler.
    ///
    /// # Errors
    /// Returns `NotFound` or `AlreadyResolved`
    pub async fn handle(self: &Arc<Self>, id: EmergencyId) -> Result<Emergency, EmergencyError> {
        let emergency = self.get(id)?;
        match emergency.status {
            EmergencyStatus::Resolved => return Err(EmergencyError::AlreadyResolved(id)),
            EmergencyStatus::Active => {
                self.enter(id, EscalationLevel::FIRST, Utc::now()).await?;
            }
            EmergencyStatus::Escalating => {}
        }
        self.catch_up(id).await
    }

    /// Resolve; resolving twice returns the first resolution
    ///
    /// Cancels only this emergency's timer. Safe-mode is left as is.
    ///
    /// # Errors
    /// Returns `NotFound` or `InvalidInput` for empty text
    pub fn resolve(&self, id: EmergencyId, text: &str) -> Result<Emergency, EmergencyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmergencyError::InvalidInput("resolution must not be empty".into()));
        }
        let (emergency, changed) =
            self.store
                .update(Collection::Emergencies, |state: &mut EmergencyState| {
                    let emergency = state.find_mut(id).ok_or(EmergencyError::NotFound(id))?;
                    if emergency.is_resolved() {
                        return Ok((emergency.clone(), false));
                    }
                    emergency.status = EmergencyStatus::Resolved;
                    emergency.deadline = None;
                    emergency.resolution = Some(Resolution {
                        text: text.to_string(),
                        resolved_at: Utc::now(),
                        level: emergency.current_level,
                    });
                    Ok::<_, EmergencyError>((emergency.clone(), true))
                })?;
        if changed {
            self.scheduler.cancel(&timer_key(id));
            info!(emergency = %id, level = emergency.current_level, "emergency resolved: {text}");
        }
        Ok(emergency)
    }

    /// # Errors
    /// Returns `NotFound` for unknown ids
    pub fn get(&self, id: EmergencyId) -> Result<Emergency, EmergencyError> {
        self.state()?
            .find(id)
            .cloned()
            .ok_or(EmergencyError::NotFound(id))
    }

    /// # Errors
    /// Returns a store error
    pub fn list(&self, filter: EmergencyFilter) -> Result<Vec<Emergency>, EmergencyError> {
        Ok(self
            .state()?
            .emergencies
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect())
    }

    /// # Errors
    /// Returns a store error
    pub fn safe_mode(&self) -> Result<SafeModeState, EmergencyError> {
        Ok(self.state()?.safe_mode)
    }

    /// # Errors
    /// Returns a store error
    pub fn is_safe_mode(&self) -> Result<bool, EmergencyError> {
        Ok(self.safe_mode()?.enabled)
    }

    /// # Errors
    /// Returns a store error
    pub fn disable_safe_mode(&self) -> Result<SafeModeState, EmergencyError> {
        let (safe_mode, was_enabled) =
            self.store
                .update(Collection::Emergencies, |state: &mut EmergencyState| {
                    let was_enabled = state.safe_mode.enabled;
                    if was_enabled {
                        state.safe_mode.enabled = false;
                        state.safe_mode.changed_at = Some(Utc::now());
                    }
                    Ok::<_, EmergencyError>((state.safe_mode.clone(), was_enabled))
                })?;
        if was_enabled {
            info!("safe-mode disabled");
        }
        Ok(safe_mode)
    }

    /// Wait until no deadline is pending for `id`
    ///
    /// Returns once the emergency is resolved, at the last level, or its timer was
    /// never armed in this process.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids
    pub async fn wait(&self, id: EmergencyId) -> Result<Emergency, EmergencyError> {
        let key = timer_key(id);
        while self.scheduler.is_scheduled(&key) {
            self.scheduler.wait(&key).await;
        }
        self.get(id)
    }

    fn state(&self) -> Result<EmergencyState, EmergencyError> {
        Ok(self
            .store
            .get::<EmergencyState>(Collection::Emergencies)?
            .data)
    }

    /// Enter every overdue level, then arm the pending deadline
    async fn catch_up(self: &Arc<Self>, id: EmergencyId) -> Result<Emergency, EmergencyError> {
        loop {
            let emergency = self.get(id)?;
            if emergency.status != EmergencyStatus::Escalating {
                return Ok(emergency);
            }
            let (Some(deadline), Some(next)) = (emergency.deadline, emergency.next_level()) else {
                return Ok(emergency);
            };
            let now = Utc::now();
            if deadline > now {
                self.arm(id, (deadline - now).to_std().unwrap_or_default());
                return Ok(emergency);
            }
            self.enter(id, next, deadline).await?;
        }
    }

    fn arm(self: &Arc<Self>, id: EmergencyId, delay: Duration) {
        let system = Arc::clone(self);
        self.scheduler.schedule_once(timer_key(id), delay, move || async move {
            if let Err(e) = system.on_timeout(id).await {
                error!(emergency = %id, error = %e, "escalation failed");
            }
        });
    }

    async fn on_timeout(self: &Arc<Self>, id: EmergencyId) -> Result<(), EmergencyError> {
        let emergency = self.get(id)?;
        if emergency.status != EmergencyStatus::Escalating {
            return Ok(());
        }
        if let Some(next) = emergency.next_level() {
            self.enter(id, next, Utc::now()).await?;
        }
        self.catch_up(id).await.map(|_| ())
    }

    /// Enter `level` if it directly follows the current one
    ///
    /// Store writes run on the blocking pool; this is reached from timer tasks.
    async fn enter(
        self: &Arc<Self>,
        id: EmergencyId,
        level: EscalationLevel,
        from: DateTime<Utc>,
    ) -> Result<Option<Emergency>, EmergencyError> {
        let system = Arc::clone(self);
        let entered = blocking(move || system.record_entry(id, level, from)).await?;
        let Some(emergency) = entered else {
            return Ok(None);
        };

        metrics::counter!("arp_escalations_total", "level" => level.number().to_string())
            .increment(1);
        if level == EscalationLevel::SafeMode {
            error!(emergency = %id, "{level} entered, safe-mode enabled");
        } else if level.reaches_human() {
            warn!(emergency = %id, "{level} entered, operator attention required");
        } else {
            info!(emergency = %id, "{level} entered");
        }

        let report = self.actions.perform(&emergency, level).await;
        let system = Arc::clone(self);
        let attached = report.clone();
        blocking(move || system.attach_report(id, level, &attached)).await?;
        if report.resolved {
            let text = report
                .note
                .unwrap_or_else(|| format!("resolved by {level} actions"));
            let system = Arc::clone(self);
            return blocking(move || system.resolve(id, &text)).await.map(Some);
        }
        Ok(Some(emergency))
    }

    /// Move the emergency onto `level`; `None` if it is resolved or `level` is not next
    ///
    /// The last level has no deadline and switches safe-mode on.
    fn record_entry(
        &self,
        id: EmergencyId,
        level: EscalationLevel,
        from: DateTime<Utc>,
    ) -> Result<Option<Emergency>, EmergencyError> {
        let timeout = level
            .timeout(&self.config)
            .map(|t| chrono::Duration::from_std(t).unwrap_or_else(|_| chrono::Duration::zero()));
        self.store
            .update(Collection::Emergencies, |state: &mut EmergencyState| {
                let emergency = state.find_mut(id).ok_or(EmergencyError::NotFound(id))?;
                if emergency.is_resolved() || emergency.next_level() != Some(level) {
                    return Ok(None);
                }
                emergency.current_level = level.number();
                emergency.escalation_history.push(LevelEntry {
                    level,
                    name: level.name().to_string(),
                    entered_at: Utc::now(),
                    report: None,
                });
                emergency.status = EmergencyStatus::Escalating;
                emergency.deadline = timeout.map(|timeout| from + timeout);
                let snapshot = emergency.clone();
                if level == EscalationLevel::SafeMode {
                    state.safe_mode = SafeModeState {
                        enabled: true,
                        reason: Some(snapshot.description.clone()),
                        emergency: Some(id),
                        changed_at: Some(Utc::now()),
                    };
                }
                Ok::<_, EmergencyError>(Some(snapshot))
            })
    }

    fn attach_report(
        &self,
        id: EmergencyId,
        level: EscalationLevel,
        report: &ActionReport,
    ) -> Result<(), EmergencyError> {
        self.store
            .update(Collection::Emergencies, |state: &mut EmergencyState| {
                if let Some(entry) = state
                    .find_mut(id)
                    .and_then(|e| e.escalation_history.iter_mut().rev().find(|l| l.level == level))
                {
                    entry.report = Some(report.clone());
                }
                Ok::<_, EmergencyError>(())
            })
    }
}

impl std::fmt::Debug for EmergencyResponseSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyResponseSystem")
            .field("config", &self.config)
            .field("inference", &self.inference.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arp_core::{ErrorKind, StoreConfig};
    use serde_json::json;

    fn system() -> (tempfile::TempDir, Arc<EmergencyResponseSystem>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap());
        let system = EmergencyResponseSystem::new(store, EmergencyConfig::default(), Scheduler::new());
        (dir, Arc::new(system))
    }

    #[test]
    fn declare_starts_at_level_zero() {
        let (_dir, system) = system();
        let e = system
            .declare("Build system failure", Severity::Critical, json!({"job": 7}))
            .unwrap();
        assert_eq!(e.status, EmergencyStatus::Active);
        assert_eq!(e.current_level, 0);
        assert_eq!(e.next_level(), Some(EscalationLevel::AutoFix));
        assert!(system.declare("  ", Severity::Low, json!({})).is_err());
    }

    #[test]
    fn resolve_is_idempotent() {
        let (_dir, system) = system();
        let e = system.declare("disk nearly full", Severity::High, json!({})).unwrap();
        let first = system.resolve(e.id, "cleaned tmp").unwrap();
        let second = system.resolve(e.id, "something else").unwrap();
        assert_eq!(first.resolution, second.resolution);
        assert_eq!(second.resolution.unwrap().text, "cleaned tmp");

        let err = system.resolve(EmergencyId::new(), "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn list_filters() {
        let (_dir, system) = system();
        let a = system.declare("a", Severity::High, json!({})).unwrap();
        system.declare("b", Severity::Low, json!({})).unwrap();
        system.resolve(a.id, "done").unwrap();

        let all = system.list(EmergencyFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        let resolved = system
            .list(EmergencyFilter {
                status: Some(EmergencyStatus::Resolved),
                severity: None,
            })
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, a.id);
        let low = system
            .list(EmergencyFilter {
                status: None,
                severity: Some(Severity::Low),
            })
            .unwrap();
        assert_eq!(low[0].description, "b");
    }

    #[tokio::test]
    async fn handle_resolved_is_rejected() {
        let (_dir, system) = system();
        let e = system.declare("flaky", Severity::Medium, json!({})).unwrap();
        system.resolve(e.id, "gone").unwrap();
        let err = system.handle(e.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyComplete);
    }

    #[test]
    fn safe_mode_is_off_until_the_last_level() {
        let (_dir, system) = system();
        assert!(!system.is_safe_mode().unwrap());
        let state = system.disable_safe_mode().unwrap();
        assert!(!state.enabled);
        assert_eq!(state.changed_at, None);
    }

    #[test]
    fn status_parses_only_the_three_states() {
        assert_eq!("escalating".parse::<EmergencyStatus>().unwrap(), EmergencyStatus::Escalating);
        assert!("safe_mode".parse::<EmergencyStatus>().is_err());
    }
}
