//! WorkflowCoordinator
//!
//! Runs one external operation through the fixed step sequence:
//!
//! ```text
//!  1 predict       2 read alerts     3 select strategy   4 load history
//!  5 knowledge     6 checkpoint      7 execute           8 validate
//!  9 rollback     10 re-verify      11 record strategy  12 update prediction
//! 13 persist      14 sync learnings 15 resolve emergency
//! ```
//!
//! A failure before step 7 changes nothing and is returned as `StepFailed`.
//! Once step 7 is reached, steps 11 to 13 run exactly once whatever happens,
//! and the checkpoint is discarded afterwards unless its restore failed.
//!
//! Store work runs on the blocking pool so a lease held by another process
//! never parks a runtime worker.

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointProvider, FileCheckpoints};
use crate::error::WorkflowError;
use crate::history::{RunRecord, WorkflowHistory};
use crate::knowledge;
use crate::operation::{OperationExecutor, OperationRequest, OperationResult, ResultValidator, TrustExecutor};
use crate::report::{PredictionSummary, RollbackOutcome, WorkflowReport};
use crate::step::WorkflowStep;
use arp_core::{
    inference_from_config, ChangeType, EmergencyId, ErrorKind, Outcome, PipelineConfig, Scheduler,
    WorkflowConfig,
};
use arp_emergency::EmergencyResponseSystem;
use arp_monitor::ProactiveMonitor;
use arp_prediction::{FailurePredictionEngine, TargetInspector};
use arp_store::{
    blocking, checkpoint_in_use, Collection, KnowledgeStore, Learning, SessionRecord, Sessions,
    StoreError,
};
use arp_strategy::{StrategyError, StrategyTracker};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Learnings consulted in step 5
const KNOWLEDGE_LIMIT: usize = 5;

pub struct WorkflowCoordinator {
    steps: Steps,
    config: WorkflowConfig,
    validator: Arc<dyn ResultValidator>,
    /// target -> session id of the invocation holding it
    in_flight: DashMap<String, String>,
}

/// Component handles the synchronous steps use; cloned onto blocking threads
#[derive(Clone)]
struct Steps {
    store: Arc<KnowledgeStore>,
    prediction: FailurePredictionEngine,
    monitor: Arc<ProactiveMonitor>,
    tracker: Arc<StrategyTracker>,
    emergency: Arc<EmergencyResponseSystem>,
    checkpoints: Arc<dyn CheckpointProvider>,
}

impl WorkflowCoordinator {
    /// Build every component on one store
    ///
    /// Checkpoint blobs go to `<store root>/checkpoints`; targets resolve
    /// against the working directory.
    #[must_use]
    pub fn new(store: Arc<KnowledgeStore>, config: &PipelineConfig, scheduler: Scheduler) -> Self {
        let emergency = EmergencyResponseSystem::new(
            Arc::clone(&store),
            config.emergency.clone(),
            scheduler.clone(),
        )
        .with_inference(inference_from_config(&config.emergency));
        let steps = Steps {
            prediction: FailurePredictionEngine::new(Arc::clone(&store), config.prediction.clone()),
            monitor: Arc::new(ProactiveMonitor::new(
                Arc::clone(&store),
                config.monitor.clone(),
                scheduler,
            )),
            tracker: Arc::new(StrategyTracker::new(Arc::clone(&store), config.strategy.clone())),
            emergency: Arc::new(emergency),
            checkpoints: Arc::new(FileCheckpoints::new(store.root().join("checkpoints"), ".")),
            store,
        };
        Self {
            steps,
            validator: Arc::new(TrustExecutor),
            in_flight: DashMap::new(),
            config: config.workflow.clone(),
        }
    }

    #[must_use]
    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointProvider>) -> Self {
        self.steps.checkpoints = checkpoints;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn ResultValidator>) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_inspector(mut self, inspector: Arc<dyn TargetInspector>) -> Self {
        self.steps.prediction = self.steps.prediction.with_inspector(inspector);
        self
    }

    /// Replace the emergency system, e.g. one with custom recovery actions
    #[must_use]
    pub fn with_emergency(mut self, emergency: Arc<EmergencyResponseSystem>) -> Self {
        self.steps.emergency = emergency;
        self
    }

    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    #[must_use]
    pub fn prediction(&self) -> &FailurePredictionEngine {
        &self.steps.prediction
    }

    #[must_use]
    pub fn monitor(&self) -> &Arc<ProactiveMonitor> {
        &self.steps.monitor
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<StrategyTracker> {
        &self.steps.tracker
    }

    #[must_use]
    pub fn emergency(&self) -> &Arc<EmergencyResponseSystem> {
        &self.steps.emergency
    }

    /// Prior runs of every target
    ///
    /// # Errors
    /// Returns a store error
    pub fn history(&self) -> Result<WorkflowHistory, WorkflowError> {
        Ok(self.steps.store.get::<WorkflowHistory>(Collection::History)?.data)
    }

    /// Run `operation` on `target` through every step
    ///
    /// # Errors
    /// - `SafeModeActive` while safe-mode is on; nothing runs
    /// - `TargetBusy` when another invocation holds the target
    /// - `StepFailed` when a step before execution fails
    /// - `OperationFailed` when execution or validation failed and the target was restored
    /// - `RollbackFailed` when the target could not be restored
    pub async fn execute(
        &self,
        operation: &str,
        target: &str,
        context: &str,
        executor: &dyn OperationExecutor,
    ) -> Result<WorkflowReport, WorkflowError> {
        let (operation, target, context) = (operation.trim(), target.trim(), context.trim());
        for (name, value) in [("operation", operation), ("target", target), ("context", context)] {
            if value.is_empty() {
                return Err(WorkflowError::InvalidInput(format!("{name} must not be empty")));
            }
        }

        let safe_mode = self
            .steps
            .emergency
            .is_safe_mode()
            .map_err(|e| WorkflowError::step(WorkflowStep::Predict, e.kind(), e))?;
        if safe_mode {
            warn!(operation, target, "refusing to run while safe-mode is active");
            return Err(WorkflowError::SafeModeActive);
        }

        let session_id = Uuid::new_v4().to_string();
        let guard = self.claim(&session_id, operation, target, context).await?;
        let result = self
            .run_claimed(session_id, operation, target, context, executor)
            .await;
        guard.release().await;
        result
    }

    async fn run_claimed(
        &self,
        session_id: String,
        operation: &str,
        target: &str,
        context: &str,
        executor: &dyn OperationExecutor,
    ) -> Result<WorkflowReport, WorkflowError> {
        let started = Instant::now();
        let report = WorkflowReport::new(session_id, operation, target, context);
        info!(session = %report.session_id, operation, target, context, "workflow started");

        let steps = self.steps.clone();
        let args = (operation.to_string(), target.to_string(), context.to_string());
        let (mut report, prepared) = blocking(move || {
            let mut report = report;
            let prepared = steps.prepare(&mut report, &args.0, &args.1, &args.2)?;
            Ok::<_, WorkflowError>((report, prepared))
        })
        .await?;

        let outcome = self.run(&mut report, &prepared, executor).await;

        let steps = self.steps.clone();
        let (mut report, outcome) = blocking(move || {
            let mut report = report;
            steps.bookkeeping(&mut report, &prepared, &outcome);
            steps.discard(&report.session_id, &prepared.checkpoint, outcome.rollback);
            Ok::<_, WorkflowError>((report, outcome))
        })
        .await?;

        report.success = outcome.success;
        report.attempts = outcome.attempts;
        report.failed_step = outcome.failed_step;
        report.rollback = outcome.rollback;
        report.emergency = outcome.emergency;
        report.elapsed_secs = started.elapsed().as_secs_f64();

        let label = match (outcome.success, outcome.rollback) {
            (true, _) => "success",
            (false, RollbackOutcome::Failed) => "rollback_failed",
            (false, _) => "failure",
        };
        metrics::counter!("arp_workflow_runs_total", "outcome" => label).increment(1);
        metrics::histogram!("arp_workflow_duration_seconds").record(report.elapsed_secs);

        if outcome.success {
            info!(
                session = %report.session_id,
                target,
                attempts = report.attempts,
                "workflow succeeded"
            );
            return Ok(report);
        }

        let step = outcome.failed_step.unwrap_or(WorkflowStep::Execute);
        if outcome.rollback == RollbackOutcome::Failed {
            let message = outcome
                .rollback_error
                .unwrap_or_else(|| "restore failed".to_string());
            error!(session = %report.session_id, target, %message, "rollback failed; operator needed");
            return Err(WorkflowError::RollbackFailed {
                target: target.to_string(),
                message,
                report: Box::new(report),
            });
        }
        warn!(session = %report.session_id, target, %step, "workflow failed; target restored");
        Err(WorkflowError::OperationFailed {
            step,
            rollback: outcome.rollback,
            report: Box::new(report),
        })
    }

    /// Steps 7 to 10, with bounded retries while an emergency is open
    async fn run(
        &self,
        report: &mut WorkflowReport,
        prepared: &Prepared,
        executor: &dyn OperationExecutor,
    ) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        loop {
            outcome.attempts += 1;
            let request = OperationRequest {
                operation: prepared.operation.clone(),
                target: prepared.target.clone(),
                context: prepared.context.clone(),
                strategy: prepared.strategy.clone(),
                attempt: outcome.attempts,
            };
            let result = self.attempt(executor, &request).await;
            outcome.operation_secs += result.elapsed.as_secs_f64();
            report.note(WorkflowStep::Execute, result.success, result.message.clone());

            let failed_step = if result.success {
                if self.validator.validate(&request, &result).await {
                    report.ok(WorkflowStep::Validate);
                    None
                } else {
                    report.note(WorkflowStep::Validate, false, "result rejected");
                    Some(WorkflowStep::Validate)
                }
            } else {
                Some(WorkflowStep::Execute)
            };

            let Some(step) = failed_step else {
                outcome.success = true;
                outcome.failed_step = None;
                report.note(WorkflowStep::Rollback, true, "not needed");
                return outcome;
            };
            outcome.failed_step = Some(step);
            warn!(
                target = %prepared.target,
                attempt = outcome.attempts,
                %step,
                "{}",
                result.message
            );

            if outcome.emergency.is_none() {
                outcome.emergency = self.raise(prepared, &request, &result).await;
            }

            let retry = outcome.emergency.is_some()
                && outcome.attempts <= self.config.max_retries
                && !self.steps.emergency.is_safe_mode().unwrap_or(true);
            if let Err(message) = self.rollback(report, &prepared.checkpoint) {
                outcome.rollback = RollbackOutcome::Failed;
                outcome.rollback_error = Some(message);
                return outcome;
            }
            outcome.rollback = RollbackOutcome::Restored;
            if !retry {
                return outcome;
            }
            debug!(target = %prepared.target, next = outcome.attempts + 1, "retrying after restore");
        }
    }

    /// Step 7 for one attempt, bounded by the operation timeout
    async fn attempt(
        &self,
        executor: &dyn OperationExecutor,
        request: &OperationRequest,
    ) -> OperationResult {
        let limit = self.config.operation_timeout();
        match tokio::time::timeout(limit, executor.execute(request)).await {
            Ok(result) => result,
            Err(_) => OperationResult::failure(
                format!("operation timed out after {}s", limit.as_secs()),
                limit,
            ),
        }
    }

    /// Declare and handle an emergency for a failed attempt
    ///
    /// Emergency bookkeeping never masks the operation's own outcome.
    async fn raise(
        &self,
        prepared: &Prepared,
        request: &OperationRequest,
        result: &OperationResult,
    ) -> Option<EmergencyId> {
        let classification = self.steps.emergency.classify_assisted(&result.message).await;
        let description = format!(
            "{} on {} failed: {}",
            prepared.operation, prepared.target, result.message
        );
        let context = serde_json::json!({
            "operation": request.operation,
            "target": request.target,
            "context": request.context,
            "strategy": request.strategy,
            "attempt": request.attempt,
        });
        let emergency = Arc::clone(&self.steps.emergency);
        let declared = blocking(move || {
            emergency.declare(&description, classification.severity, context)
        })
        .await;
        let declared = match declared {
            Ok(emergency) => emergency,
            Err(e) => {
                warn!(error = %e, "could not declare emergency");
                return None;
            }
        };
        if let Err(e) = self.steps.emergency.handle(declared.id).await {
            warn!(emergency = %declared.id, error = %e, "could not handle emergency");
        }
        Some(declared.id)
    }

    /// Steps 9 and 10
    fn rollback(&self, report: &mut WorkflowReport, checkpoint: &Checkpoint) -> Result<(), String> {
        let checkpoints = &self.steps.checkpoints;
        let restored = checkpoints.restore(checkpoint).and_then(|()| {
            report.ok(WorkflowStep::Rollback);
            if checkpoints.verify(checkpoint)? {
                Ok(())
            } else {
                Err(CheckpointError::Mismatch {
                    target: checkpoint.target.clone(),
                })
            }
        });
        match restored {
            Ok(()) => {
                metrics::counter!("arp_rollbacks_total", "outcome" => "restored").increment(1);
                report.ok(WorkflowStep::Reverify);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("arp_rollbacks_total", "outcome" => "failed").increment(1);
                let step = if matches!(e, CheckpointError::Mismatch { .. }) {
                    WorkflowStep::Reverify
                } else {
                    WorkflowStep::Rollback
                };
                report.note(step, false, e.to_string());
                Err(e.to_string())
            }
        }
    }

    /// Hold `target` for this invocation, in-process and in the `sessions` collection
    ///
    /// Sessions older than the lock timeout are treated as abandoned.
    async fn claim(
        &self,
        session_id: &str,
        operation: &str,
        target: &str,
        context: &str,
    ) -> Result<TargetGuard<'_>, WorkflowError> {
        match self.in_flight.entry(target.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(WorkflowError::TargetBusy(target.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session_id.to_string());
            }
        }
        let mut guard = TargetGuard {
            coordinator: self,
            target: target.to_string(),
            session_id: None,
        };

        let store = Arc::clone(&self.steps.store);
        let stale_before = Utc::now()
            - chrono::Duration::from_std(store.config().lock_timeout())
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let record = SessionRecord::new(session_id, operation, target, context);
        blocking(move || {
            store.update(Collection::Sessions, |sessions: &mut Sessions| {
                let held = sessions
                    .values()
                    .any(|s| s.target == record.target && s.started_at > stale_before);
                if held {
                    return Err(WorkflowError::TargetBusy(record.target.clone()));
                }
                sessions.insert(record.id.clone(), record);
                Ok(())
            })
        })
        .await?;
        guard.session_id = Some(session_id.to_string());
        Ok(guard)
    }
}

impl Steps {
    /// Steps 1 to 6
    fn prepare(
        &self,
        report: &mut WorkflowReport,
        operation: &str,
        target: &str,
        context: &str,
    ) -> Result<Prepared, WorkflowError> {
        let change = operation.parse::<ChangeType>().unwrap_or_default();
        let prediction = self
            .prediction
            .analyze(target, change)
            .map_err(|e| WorkflowError::step(WorkflowStep::Predict, e.kind(), e))?;
        report.prediction = Some(PredictionSummary {
            id: prediction.id,
            risk_score: prediction.risk_score,
            risk_level: prediction.risk_level,
            recommendation: prediction.recommendation.clone(),
        });
        report.ok(WorkflowStep::Predict);

        let alerts = self
            .monitor
            .alerts()
            .map_err(|e| WorkflowError::step(WorkflowStep::ReadAlerts, e.kind(), e))?
            .into_iter()
            .filter(|a| a.target == target)
            .count();
        report.active_alerts = alerts;
        if alerts > 0 {
            warn!(target, alerts, "target has active alerts");
            report.note(WorkflowStep::ReadAlerts, true, format!("{alerts} active alerts"));
        } else {
            report.ok(WorkflowStep::ReadAlerts);
        }

        let strategy = match self.tracker.best(context) {
            Ok(recommendation) => Some(recommendation.strategy_id),
            Err(StrategyError::NoStrategyAvailable { .. }) => None,
            Err(e) => return Err(WorkflowError::step(WorkflowStep::SelectStrategy, e.kind(), e)),
        };
        match &strategy {
            Some(id) => report.note(WorkflowStep::SelectStrategy, true, id.clone()),
            None => report.note(WorkflowStep::SelectStrategy, true, "no strategy available"),
        }
        report.strategy.clone_from(&strategy);

        report.history = self
            .store
            .get::<WorkflowHistory>(Collection::History)
            .map_err(|e| WorkflowError::step(WorkflowStep::LoadHistory, e.kind(), e))?
            .data
            .summary_for(target);
        report.ok(WorkflowStep::LoadHistory);

        report.learnings = knowledge::query(&self.store, context, KNOWLEDGE_LIMIT)
            .map_err(|e| WorkflowError::step(WorkflowStep::QueryKnowledge, e.kind(), e))?;
        report.ok(WorkflowStep::QueryKnowledge);

        let checkpoint = self.checkpoint(&report.session_id, target)?;
        report.checkpoint = Some(checkpoint.clone());
        report.ok(WorkflowStep::Checkpoint);

        Ok(Prepared {
            operation: operation.to_string(),
            target: target.to_string(),
            context: context.to_string(),
            strategy,
            prediction,
            checkpoint,
        })
    }

    /// Snapshot `target` and note its digest on the session
    ///
    /// Both happen under the `sessions` lease, so a concurrent discard of a
    /// shared blob either sees this session or runs before the snapshot.
    fn checkpoint(&self, session_id: &str, target: &str) -> Result<Checkpoint, WorkflowError> {
        self.store
            .update(Collection::Sessions, |sessions: &mut Sessions| {
                let checkpoint = self.checkpoints.snapshot(target).map_err(|e| {
                    WorkflowError::step(WorkflowStep::Checkpoint, ErrorKind::Unavailable, e)
                })?;
                if let Some(session) = sessions.get_mut(session_id) {
                    session.checkpoint.clone_from(&checkpoint.digest);
                }
                Ok(checkpoint)
            })
            .map_err(|e| match e {
                WorkflowError::Store(e) => WorkflowError::step(WorkflowStep::Checkpoint, e.kind(), e),
                other => other,
            })
    }

    /// Steps 11 to 15; each failure is logged and noted, never returned
    fn bookkeeping(&self, report: &mut WorkflowReport, prepared: &Prepared, outcome: &RunOutcome) {
        let success = outcome.success;

        match &prepared.strategy {
            Some(id) => match self
                .tracker
                .record(id, &prepared.context, success, outcome.operation_secs)
            {
                Ok(_) => report.ok(WorkflowStep::RecordStrategy),
                Err(e) => {
                    warn!(strategy = %id, error = %e, "strategy outcome not recorded");
                    report.note(WorkflowStep::RecordStrategy, false, e.to_string());
                }
            },
            None => report.note(WorkflowStep::RecordStrategy, true, "no strategy"),
        }

        match self
            .prediction
            .update(prepared.prediction.id, Outcome::from_success(success))
        {
            Ok(_) => report.ok(WorkflowStep::UpdatePrediction),
            Err(e) => {
                warn!(prediction = %prepared.prediction.id, error = %e, "prediction outcome not recorded");
                report.note(WorkflowStep::UpdatePrediction, false, e.to_string());
            }
        }

        let run = RunRecord {
            session_id: report.session_id.clone(),
            operation: prepared.operation.clone(),
            target: prepared.target.clone(),
            context: prepared.context.clone(),
            strategy: prepared.strategy.clone(),
            prediction: prepared.prediction.id,
            risk_level: prepared.prediction.risk_level,
            success,
            attempts: outcome.attempts,
            failed_step: outcome.failed_step,
            rollback: outcome.rollback,
            emergency: outcome.emergency,
            elapsed_secs: outcome.operation_secs,
            finished_at: Utc::now(),
        };
        let persisted = self
            .store
            .update(Collection::History, |history: &mut WorkflowHistory| {
                history.push(run);
                Ok::<_, StoreError>(())
            });
        match persisted {
            Ok(()) => report.ok(WorkflowStep::PersistHistory),
            Err(e) => {
                warn!(error = %e, "run history not persisted");
                report.note(WorkflowStep::PersistHistory, false, e.to_string());
            }
        }

        let learning = Learning {
            context: prepared.context.clone(),
            operation: prepared.operation.clone(),
            target: prepared.target.clone(),
            strategy: prepared.strategy.clone().unwrap_or_default(),
            success,
            elapsed_secs: outcome.operation_secs,
            note: outcome.failed_step.map(|s| format!("failed at {s}")),
            recorded_at: Utc::now(),
        };
        match knowledge::sync(&self.store, learning) {
            Ok(()) => report.ok(WorkflowStep::SyncLearnings),
            Err(e) => {
                warn!(error = %e, "learning not synced");
                report.note(WorkflowStep::SyncLearnings, false, e.to_string());
            }
        }

        match outcome.emergency {
            Some(id) if success => {
                let text = format!("operation succeeded on attempt {}", outcome.attempts);
                match self.emergency.resolve(id, &text) {
                    Ok(_) => report.ok(WorkflowStep::ResolveEmergency),
                    Err(e) => {
                        warn!(emergency = %id, error = %e, "emergency not resolved");
                        report.note(WorkflowStep::ResolveEmergency, false, e.to_string());
                    }
                }
            }
            Some(id) => report.note(WorkflowStep::ResolveEmergency, false, format!("{id} still open")),
            None => report.note(WorkflowStep::ResolveEmergency, true, "no emergency"),
        }
    }

    /// Drop the checkpoint unless another session still holds the same blob
    ///
    /// After a failed restore the blob stays for manual recovery.
    fn discard(&self, session_id: &str, checkpoint: &Checkpoint, rollback: RollbackOutcome) {
        if rollback == RollbackOutcome::Failed {
            warn!(
                target = %checkpoint.target,
                digest = checkpoint.digest.as_deref().unwrap_or("absent"),
                "checkpoint kept for manual recovery"
            );
            return;
        }
        let discarded = self
            .store
            .update(Collection::Sessions, |sessions: &mut Sessions| {
                if let Some(session) = sessions.get_mut(session_id) {
                    session.checkpoint = None;
                }
                let shared = checkpoint
                    .digest
                    .as_deref()
                    .is_some_and(|digest| checkpoint_in_use(sessions, digest, session_id));
                if shared {
                    return Ok(false);
                }
                self.checkpoints.discard(checkpoint).map_err(|e| {
                    WorkflowError::step(WorkflowStep::Checkpoint, ErrorKind::Unavailable, e)
                })?;
                Ok::<_, WorkflowError>(true)
            });
        match discarded {
            Ok(true) => {}
            Ok(false) => debug!(target = %checkpoint.target, "checkpoint shared with another session; kept"),
            Err(e) => warn!(target = %checkpoint.target, error = %e, "checkpoint not discarded"),
        }
    }
}

impl std::fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowCoordinator")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Everything steps 1 to 6 produced
struct Prepared {
    operation: String,
    target: String,
    context: String,
    strategy: Option<String>,
    prediction: arp_prediction::PredictionRecord,
    checkpoint: Checkpoint,
}

#[derive(Default)]
struct RunOutcome {
    success: bool,
    attempts: u32,
    failed_step: Option<WorkflowStep>,
    rollback: RollbackOutcome,
    rollback_error: Option<String>,
    emergency: Option<EmergencyId>,
    /// Sum of the executor-reported durations
    operation_secs: f64,
}

/// Holds a target for one invocation
///
/// `release` removes the session record; dropping without it (a cancelled
/// `execute`) hands the removal to the blocking pool.
struct TargetGuard<'a> {
    coordinator: &'a WorkflowCoordinator,
    target: String,
    session_id: Option<String>,
}

impl TargetGuard<'_> {
    async fn release(mut self) {
        if let Some(id) = self.session_id.take() {
            let store = Arc::clone(&self.coordinator.steps.store);
            let removed = blocking(move || {
                forget_session(&store, &id);
                Ok::<_, StoreError>(())
            })
            .await;
            if let Err(e) = removed {
                warn!(error = %e, "session record left behind");
            }
        }
    }
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.session_id.take() {
            let store = Arc::clone(&self.coordinator.steps.store);
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn_blocking(move || forget_session(&store, &id));
                }
                Err(_) => forget_session(&store, &id),
            }
        }
        self.coordinator.in_flight.remove(&self.target);
    }
}

fn forget_session(store: &KnowledgeStore, id: &str) {
    let removed = store.update(Collection::Sessions, |sessions: &mut Sessions| {
        sessions.remove(id);
        Ok::<_, StoreError>(())
    });
    if let Err(e) = removed {
        warn!(session = %id, error = %e, "session record left behind");
    }
}
