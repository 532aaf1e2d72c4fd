//! Coordinator runs against a real store and work directory

use arp_core::{ErrorKind, Outcome, Severity};
use arp_emergency::{EmergencyState, EmergencyStatus};
use arp_monitor::MonitorType;
use arp_store::{Collection, SessionRecord, Sessions, StoreError};
use arp_test_utils::{test_config, ScriptedExecutor, Workspace};
use arp_workflow::{
    Checkpoint, CheckpointError, CheckpointProvider, OperationExecutor, OperationRequest,
    OperationResult, ResultValidator, RollbackOutcome, WorkflowError, WorkflowStep,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const TARGET: &str = "src/app.rs";
const ORIGINAL: &str = "fn main() {\n    println!(\"hello\");\n}\n";

fn bookkeeping_ran_once(report: &arp_workflow::WorkflowReport) {
    for step in [
        WorkflowStep::RecordStrategy,
        WorkflowStep::UpdatePrediction,
        WorkflowStep::PersistHistory,
        WorkflowStep::SyncLearnings,
        WorkflowStep::ResolveEmergency,
    ] {
        assert_eq!(report.count(step), 1, "{step}");
    }
}

#[tokio::test]
async fn successful_run_records_everything_once() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let coordinator = ws.coordinator(&test_config());
    let executor = ScriptedExecutor::succeeding().writing(ws.path(TARGET), "fn main() {}\n");

    let report = coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.failed_step, None);
    assert_eq!(report.rollback, RollbackOutcome::NotNeeded);
    assert_eq!(report.emergency, None);
    assert_eq!(report.strategy.as_deref(), Some("rebuild"));
    assert!(report.checkpoint.as_ref().is_some_and(Checkpoint::existed));
    bookkeeping_ran_once(&report);
    assert_eq!(ws.read(TARGET).as_deref(), Some("fn main() {}\n"));

    let stats = coordinator.tracker().get("rebuild").unwrap().stats_for("build_error");
    assert_eq!(stats.samples(), 1);
    assert!((stats.total_time - 30.0).abs() < 1e-9);

    let prediction = report.prediction.as_ref().unwrap();
    let stored = coordinator.prediction().get(prediction.id).unwrap();
    assert_eq!(stored.outcome, Some(Outcome::Success));

    let history = coordinator.history().unwrap();
    assert_eq!(history.runs.len(), 1);
    assert!(history.runs[0].success);
    assert_eq!(history.summary_for(TARGET).runs, 1);

    let learnings = arp_workflow::knowledge::query(&ws.store, "build_error", 10).unwrap();
    assert_eq!(learnings.len(), 1);
    assert_eq!(learnings[0].strategy, "rebuild");

    let sessions = ws.store.get::<Sessions>(Collection::Sessions).unwrap().data;
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn failed_run_restores_target_and_leaves_emergency_open() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let mut config = test_config();
    config.workflow.max_retries = 0;
    let coordinator = ws.coordinator(&config);
    let executor = ScriptedExecutor::failing().writing(ws.path(TARGET), "fn main( {");

    let err = coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationFailed);
    let WorkflowError::OperationFailed { step, rollback, report } = err else {
        panic!("unexpected error");
    };
    assert_eq!(step, WorkflowStep::Execute);
    assert_eq!(rollback, RollbackOutcome::Restored);
    assert_eq!(ws.read(TARGET).as_deref(), Some(ORIGINAL));
    assert_eq!(report.attempts, 1);
    bookkeeping_ran_once(&report);

    let emergency = coordinator.emergency().get(report.emergency.unwrap()).unwrap();
    assert_eq!(emergency.severity, Severity::High);
    assert_eq!(emergency.status, EmergencyStatus::Escalating);
    assert_eq!(emergency.current_level, 1);

    let stored = coordinator
        .prediction()
        .get(report.prediction.as_ref().unwrap().id)
        .unwrap();
    assert_eq!(stored.outcome, Some(Outcome::Failure));

    let run = &coordinator.history().unwrap().runs[0];
    assert!(!run.success);
    assert_eq!(run.failed_step, Some(WorkflowStep::Execute));
    assert_eq!(run.rollback, RollbackOutcome::Restored);
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn retry_after_restore_resolves_the_emergency() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let coordinator = ws.coordinator(&test_config());
    let executor = ScriptedExecutor::new([false, true]).writing(ws.path(TARGET), "fn main() {}\n");

    let report = coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.count(WorkflowStep::Execute), 2);
    bookkeeping_ran_once(&report);
    let attempts: Vec<u32> = executor.calls().iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);

    let emergency = coordinator.emergency().get(report.emergency.unwrap()).unwrap();
    assert_eq!(emergency.status, EmergencyStatus::Resolved);
    assert!(emergency.resolution.unwrap().text.contains("attempt 2"));
    assert_eq!(ws.read(TARGET).as_deref(), Some("fn main() {}\n"));

    // one run, measured over both attempts
    let stats = coordinator.tracker().get("rebuild").unwrap().stats_for("build_error");
    assert_eq!(stats.samples(), 1);
    assert_eq!(stats.success_count, 1);
    assert!((stats.total_time - 60.0).abs() < 1e-9);
}

#[tokio::test]
async fn retries_are_bounded() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let mut config = test_config();
    config.workflow.max_retries = 2;
    let coordinator = ws.coordinator(&config);
    let executor = ScriptedExecutor::failing();

    let err = coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap_err();

    assert_eq!(executor.calls().len(), 3);
    assert_eq!(err.report().unwrap().attempts, 3);
    // a single emergency covers every attempt
    let open = coordinator.emergency().list(Default::default()).unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn safe_mode_blocks_before_any_step() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let coordinator = ws.coordinator(&test_config());
    ws.store
        .update(Collection::Emergencies, |state: &mut EmergencyState| {
            state.safe_mode.enabled = true;
            Ok::<_, StoreError>(())
        })
        .unwrap();
    let executor = ScriptedExecutor::succeeding();

    let err = coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::SafeModeActive));
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(executor.calls().is_empty());
    assert_eq!(coordinator.prediction().accuracy_report().unwrap().total_predictions, 0);
    assert!(coordinator.history().unwrap().runs.is_empty());

    coordinator.emergency().disable_safe_mode().unwrap();
    assert!(coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .is_ok());
}

#[tokio::test]
async fn target_held_by_another_process_is_busy() {
    let ws = Workspace::new();
    let coordinator = ws.coordinator(&test_config());
    let other = SessionRecord::new("other-process", "modify", TARGET, "build_error");
    let sessions: Sessions = [(other.id.clone(), other)].into_iter().collect();
    ws.store.put(Collection::Sessions, &sessions).unwrap();
    let executor = ScriptedExecutor::succeeding();

    let err = coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::TargetBusy(ref t) if t == TARGET));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(executor.calls().is_empty());

    // other targets are unaffected
    assert!(coordinator
        .execute("modify", "src/other.rs", "build_error", &executor)
        .await
        .is_ok());
}

#[tokio::test]
async fn absent_target_is_restored_to_absent() {
    let ws = Workspace::new();
    let mut config = test_config();
    config.workflow.max_retries = 0;
    let coordinator = ws.coordinator(&config);
    std::fs::create_dir_all(ws.path("src")).unwrap();
    let executor = ScriptedExecutor::failing().writing(ws.path("src/generated.rs"), "half written");

    let err = coordinator
        .execute("add", "src/generated.rs", "missing_module", &executor)
        .await
        .unwrap_err();

    let report = err.report().unwrap();
    assert!(!report.checkpoint.as_ref().unwrap().existed());
    assert_eq!(report.rollback, RollbackOutcome::Restored);
    assert_eq!(report.strategy.as_deref(), Some("fix_imports"));
    assert!(!ws.path("src/generated.rs").exists());
}

struct RejectAll;

#[async_trait]
impl ResultValidator for RejectAll {
    async fn validate(&self, _request: &OperationRequest, _result: &OperationResult) -> bool {
        false
    }
}

#[tokio::test]
async fn validator_rejection_fails_at_validate() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let mut config = test_config();
    config.workflow.max_retries = 0;
    let coordinator = ws.coordinator(&config).with_validator(Arc::new(RejectAll));
    let executor = ScriptedExecutor::succeeding().writing(ws.path(TARGET), "unreviewed");

    let err = coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::OperationFailed { step: WorkflowStep::Validate, .. }
    ));
    assert_eq!(ws.read(TARGET).as_deref(), Some(ORIGINAL));
}

/// Snapshots fine, never restores
struct BrokenRestore;

impl CheckpointProvider for BrokenRestore {
    fn snapshot(&self, target: &str) -> Result<Checkpoint, CheckpointError> {
        Ok(Checkpoint {
            target: target.to_string(),
            digest: None,
            taken_at: chrono::Utc::now(),
        })
    }

    fn restore(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        Err(CheckpointError::Mismatch {
            target: checkpoint.target.clone(),
        })
    }

    fn verify(&self, _checkpoint: &Checkpoint) -> Result<bool, CheckpointError> {
        Ok(false)
    }

    fn discard(&self, _checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_restore_is_fatal_and_still_recorded() {
    let ws = Workspace::new();
    let coordinator = ws.coordinator(&test_config()).with_checkpoints(Arc::new(BrokenRestore));
    let executor = ScriptedExecutor::failing();

    let err = coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(matches!(err, WorkflowError::RollbackFailed { .. }));
    let report = err.report().unwrap();
    assert_eq!(report.rollback, RollbackOutcome::Failed);
    // no retry once the target cannot be put back
    assert_eq!(executor.calls().len(), 1);
    bookkeeping_ran_once(report);
    assert_eq!(coordinator.history().unwrap().runs[0].rollback, RollbackOutcome::Failed);
}

struct Hangs;

#[async_trait]
impl OperationExecutor for Hangs {
    async fn execute(&self, _request: &OperationRequest) -> OperationResult {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        OperationResult::success("too late", Duration::from_secs(3600))
    }
}

#[tokio::test(start_paused = true)]
async fn operation_timeout_counts_as_failure() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let mut config = test_config();
    config.workflow.max_retries = 0;
    config.workflow.operation_timeout_secs = 5;
    let coordinator = ws.coordinator(&config);

    let err = coordinator
        .execute("modify", TARGET, "build_error", &Hangs)
        .await
        .unwrap_err();

    let report = err.report().unwrap();
    let execute = report
        .steps
        .iter()
        .find(|s| s.step == WorkflowStep::Execute)
        .unwrap();
    assert!(execute.detail.as_deref().unwrap().contains("timed out after 5s"));
}

#[tokio::test]
async fn active_alerts_on_the_target_are_reported() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let coordinator = ws.coordinator(&test_config());
    let monitor = coordinator.monitor();
    monitor.record(MonitorType::Complexity, TARGET, 10.0).unwrap();
    monitor.record(MonitorType::Complexity, TARGET, 22.0).unwrap();
    monitor.record(MonitorType::ErrorRate, "elsewhere", 50.0).unwrap();
    monitor.run().unwrap();

    let report = coordinator
        .execute("modify", TARGET, "build_error", &ScriptedExecutor::succeeding())
        .await
        .unwrap();
    assert_eq!(report.active_alerts, 1);
}

fn blob_count(ws: &Workspace) -> usize {
    std::fs::read_dir(ws.state_dir().join("checkpoints"))
        .map(|dir| dir.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn finished_runs_leave_no_checkpoint_blobs() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let coordinator = ws.coordinator(&test_config());

    for round in 0..5 {
        let executor = ScriptedExecutor::succeeding()
            .writing(ws.path(TARGET), &format!("fn main() {{ /* {round} */ }}\n"));
        coordinator
            .execute("modify", TARGET, "build_error", &executor)
            .await
            .unwrap();
    }
    assert_eq!(blob_count(&ws), 0);

    let mut config = test_config();
    config.workflow.max_retries = 0;
    let coordinator = ws.coordinator(&config);
    let executor = ScriptedExecutor::failing().writing(ws.path(TARGET), "fn main( {");
    coordinator
        .execute("modify", TARGET, "build_error", &executor)
        .await
        .unwrap_err();
    assert_eq!(blob_count(&ws), 0);
    assert!(ws.read(TARGET).unwrap().contains("/* 4 */"));
}

#[tokio::test]
async fn blob_shared_with_a_live_session_is_kept() {
    let ws = Workspace::new();
    ws.write(TARGET, ORIGINAL);
    let coordinator = ws.coordinator(&test_config());
    let checkpoint = ws.checkpoints().snapshot(TARGET).unwrap();

    let mut other = SessionRecord::new("other-process", "modify", "src/copy.rs", "build_error");
    other.checkpoint.clone_from(&checkpoint.digest);
    let sessions: Sessions = [(other.id.clone(), other)].into_iter().collect();
    ws.store.put(Collection::Sessions, &sessions).unwrap();

    let report = coordinator
        .execute("modify", TARGET, "build_error", &ScriptedExecutor::succeeding())
        .await
        .unwrap();
    assert_eq!(report.checkpoint.unwrap().digest, checkpoint.digest);
    assert_eq!(blob_count(&ws), 1);

    ws.store.put(Collection::Sessions, &Sessions::default()).unwrap();
    coordinator
        .execute("modify", TARGET, "build_error", &ScriptedExecutor::succeeding())
        .await
        .unwrap();
    assert_eq!(blob_count(&ws), 0);
}
