//! Subcommand dispatch; every command yields one JSON value

use crate::cli::{
    Cli, Command, EmergencyCommand, EvolutionCommand, KnowledgeCommand, MonitorCommand,
    PredictionCommand, StoreCommand, StrategyCommand, WorkflowCommand,
};
use anyhow::{Context, Result};
use arp_core::{ErrorKind, PipelineConfig, Scheduler};
use arp_emergency::{EmergencyError, EmergencyFilter, EmergencyResponseSystem};
use arp_monitor::{MonitorError, ProactiveMonitor};
use arp_prediction::{FailurePredictionEngine, PredictionError};
use arp_store::{KnowledgeStore, LockMonitor, StoreError};
use arp_strategy::{Bucket, StrategyError, StrategyEvolution, StrategyTracker};
use arp_workflow::{knowledge, CommandExecutor, WorkflowCoordinator, WorkflowError};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Bad command-line input that clap could not catch
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Store, configuration and scheduler shared by every command
pub struct Pipeline {
    pub store: Arc<KnowledgeStore>,
    pub config: PipelineConfig,
    pub scheduler: Scheduler,
}

impl Pipeline {
    /// Load configuration and open the store under the state directory
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the state
    /// directory cannot be created
    pub fn open(cli: &Cli) -> Result<Self> {
        let config = PipelineConfig::load(cli.config.as_deref(), &cli.state_dir)
            .context("loading configuration")?;
        let store = KnowledgeStore::open(&cli.state_dir, config.store.clone())?;
        debug!(state_dir = %cli.state_dir.display(), "pipeline opened");
        Ok(Self {
            store: Arc::new(store),
            config,
            scheduler: Scheduler::new(),
        })
    }

    fn prediction(&self) -> FailurePredictionEngine {
        FailurePredictionEngine::new(Arc::clone(&self.store), self.config.prediction.clone())
    }

    fn monitor(&self) -> Arc<ProactiveMonitor> {
        Arc::new(ProactiveMonitor::new(
            Arc::clone(&self.store),
            self.config.monitor.clone(),
            self.scheduler.clone(),
        ))
    }

    fn tracker(&self) -> Arc<StrategyTracker> {
        Arc::new(StrategyTracker::new(
            Arc::clone(&self.store),
            self.config.strategy.clone(),
        ))
    }

    fn emergency(&self) -> Arc<EmergencyResponseSystem> {
        Arc::new(
            EmergencyResponseSystem::new(
                Arc::clone(&self.store),
                self.config.emergency.clone(),
                self.scheduler.clone(),
            )
            .with_inference(arp_core::inference_from_config(&self.config.emergency)),
        )
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Execute the parsed command line
///
/// # Errors
/// Returns the failing component's error
pub async fn run(cli: Cli) -> Result<Value> {
    let pipeline = Pipeline::open(&cli)?;
    match cli.command {
        Command::Prediction { command } => prediction(&pipeline, command),
        Command::Monitor { command } => monitor(&pipeline, command).await,
        Command::Strategy { command } => strategy(&pipeline, command),
        Command::Evolution { command } => evolution(&pipeline, command),
        Command::Emergency { command } => emergency(&pipeline, command).await,
        Command::Workflow { command } => workflow(&pipeline, command).await,
        Command::Knowledge { command } => knowledge_cmd(&pipeline, command),
        Command::Store { command } => match command {
            StoreCommand::Prune => {
                to_json(LockMonitor::new(Arc::clone(&pipeline.store)).prune(chrono::Utc::now())?)
            }
        },
    }
}

fn prediction(pipeline: &Pipeline, command: PredictionCommand) -> Result<Value> {
    let engine = pipeline.prediction();
    match command {
        PredictionCommand::Analyze {
            target,
            change_type,
        } => to_json(engine.analyze(&target, change_type)?),
        PredictionCommand::Update { id, outcome } => {
            let change = engine.update(id, outcome)?;
            Ok(json!({ "id": id, "outcome": outcome, "result": change }))
        }
        PredictionCommand::Show { id } => to_json(engine.get(id)?),
        PredictionCommand::Accuracy { report: false } => Ok(json!(engine.accuracy()?)),
        PredictionCommand::Accuracy { report: true } => to_json(engine.accuracy_report()?),
    }
}

async fn monitor(pipeline: &Pipeline, command: MonitorCommand) -> Result<Value> {
    let monitor = pipeline.monitor();
    match command {
        MonitorCommand::Init => to_json(monitor.init()?),
        MonitorCommand::Run => to_json(monitor.run()?),
        MonitorCommand::Watch => {
            monitor
                .watch(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "cannot listen for interrupt");
                    }
                })
                .await?;
            to_json(monitor.status()?)
        }
        MonitorCommand::Status => to_json(monitor.status()?),
        MonitorCommand::Alerts => to_json(monitor.alerts()?),
        MonitorCommand::Resolve { alert_id } => to_json(monitor.resolve(alert_id)?),
        MonitorCommand::Record {
            monitor_type,
            target,
            value,
        } => to_json(monitor.record(monitor_type, &target, value)?),
    }
}

fn strategy(pipeline: &Pipeline, command: StrategyCommand) -> Result<Value> {
    let tracker = pipeline.tracker();
    match command {
        StrategyCommand::Record(args) => {
            let stats = tracker.record(&args.id, &args.context, args.success, args.time)?;
            Ok(json!({ "strategyId": args.id, "context": args.context, "stats": stats }))
        }
        StrategyCommand::Adapt {
            id,
            description,
            impact,
        } => to_json(tracker.adapt(&id, &description, &impact)?),
        StrategyCommand::Performance { id } => to_json(tracker.performance(&id)?),
        StrategyCommand::Best { context } => to_json(tracker.best(&context)?),
        StrategyCommand::List => to_json(tracker.list()?),
        StrategyCommand::Recommend { context } => to_json(tracker.recommend(&context)?),
        StrategyCommand::Compare { ids } => {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            to_json(tracker.compare(&ids)?)
        }
    }
}

fn evolution(pipeline: &Pipeline, command: EvolutionCommand) -> Result<Value> {
    let evolution = StrategyEvolution::new(pipeline.tracker());
    match command {
        EvolutionCommand::Variant { id } => to_json(evolution.variant(&id)?),
        EvolutionCommand::CreateTest {
            id,
            context,
            sample_size,
        } => {
            let experiment = evolution.create_test(&id, &context, sample_size)?;
            Ok(json!({ "experimentId": experiment.id }))
        }
        EvolutionCommand::Record {
            experiment_id,
            bucket,
            success,
            time,
        } => {
            let bucket: Bucket = bucket.parse()?;
            to_json(evolution.record(experiment_id, bucket, success, time)?)
        }
        EvolutionCommand::Status { experiment_id } => to_json(evolution.status(experiment_id)?),
        EvolutionCommand::List => to_json(evolution.list()?),
        EvolutionCommand::History => to_json(evolution.history()?),
    }
}

async fn emergency(pipeline: &Pipeline, command: EmergencyCommand) -> Result<Value> {
    let system = pipeline.emergency();
    match command {
        EmergencyCommand::Classify { message, assisted } => {
            if assisted {
                to_json(system.classify_assisted(&message).await)
            } else {
                Ok(json!({ "severity": system.classify(&message), "source": "rules" }))
            }
        }
        EmergencyCommand::Declare {
            description,
            severity,
            context,
        } => {
            let context = match context {
                Some(raw) => serde_json::from_str(&raw)
                    .map_err(|e| UsageError(format!("context is not valid JSON: {e}")))?,
                None => json!({}),
            };
            let declared = system.declare(&description, severity, context)?;
            Ok(json!({ "id": declared.id }))
        }
        EmergencyCommand::Handle { id, wait } => {
            let handled = system.handle(id).await?;
            if wait {
                to_json(system.wait(id).await?)
            } else {
                to_json(handled)
            }
        }
        EmergencyCommand::Resolve { id, text } => to_json(system.resolve(id, &text)?),
        EmergencyCommand::List { status, severity } => {
            to_json(system.list(EmergencyFilter { status, severity })?)
        }
        EmergencyCommand::SafeMode => to_json(system.safe_mode()?),
        EmergencyCommand::DisableSafeMode => to_json(system.disable_safe_mode()?),
    }
}

async fn workflow(pipeline: &Pipeline, command: WorkflowCommand) -> Result<Value> {
    let coordinator = WorkflowCoordinator::new(
        Arc::clone(&pipeline.store),
        &pipeline.config,
        pipeline.scheduler.clone(),
    );
    match command {
        WorkflowCommand::Run {
            operation,
            target,
            context,
            command,
        } => {
            let executor = CommandExecutor::from_argv(&command)
                .ok_or_else(|| UsageError("missing command after --".into()))?;
            to_json(
                coordinator
                    .execute(&operation, &target, &context, &executor)
                    .await?,
            )
        }
        WorkflowCommand::History { target } => {
            let history = coordinator.history()?;
            match target {
                Some(target) => Ok(json!({
                    "summary": history.summary_for(&target),
                    "runs": history.runs.iter().filter(|r| r.target == target).collect::<Vec<_>>(),
                })),
                None => to_json(history),
            }
        }
    }
}

fn knowledge_cmd(pipeline: &Pipeline, command: KnowledgeCommand) -> Result<Value> {
    match command {
        KnowledgeCommand::Query { context, limit } => {
            to_json(knowledge::query(&pipeline.store, &context, limit)?)
        }
        KnowledgeCommand::AddPattern {
            pattern,
            severity,
            category,
            message,
        } => {
            if !knowledge::add_pattern(&pipeline.store, &pattern, severity, &category, &message)? {
                return Err(UsageError(format!("invalid pattern: {pattern}")).into());
            }
            Ok(json!({ "pattern": pattern, "severity": severity, "added": true }))
        }
        KnowledgeCommand::Patterns => to_json(knowledge::patterns(&pipeline.store)?),
    }
}

/// Classify an error for the JSON envelope
#[must_use]
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<WorkflowError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<EmergencyError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<StrategyError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<MonitorError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<PredictionError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return e.kind();
        }
        if cause.is::<UsageError>() || cause.is::<arp_core::ConfigError>() {
            return ErrorKind::InvalidInput;
        }
    }
    ErrorKind::Fatal
}

/// `{"error", "kind"}`, plus the run report for failed workflows
#[must_use]
pub fn error_envelope(err: &anyhow::Error) -> Value {
    let mut envelope = json!({
        "error": format!("{err:#}"),
        "kind": error_kind(err),
    });
    let report = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<WorkflowError>())
        .and_then(WorkflowError::report);
    if let (Some(report), Some(map)) = (report, envelope.as_object_mut()) {
        if let Ok(report) = serde_json::to_value(report) {
            map.insert("report".to_string(), report);
        }
    }
    envelope
}
