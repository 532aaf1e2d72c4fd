//! ProactiveMonitor

use crate::error::MonitorError;
use crate::metric::{Alert, AlertStatus, MonitorMetric, MonitorState, MonitorType};
use arp_core::{AlertId, MonitorConfig, Scheduler, TimerKey};
use arp_store::{blocking, Collection, KnowledgeStore};
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const WATCH_TIMER: &str = "monitor.watch";

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub evaluated: usize,
    pub breached: usize,
    pub raised: Vec<Alert>,
}

/// Current versus threshold for one monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub monitor_type: MonitorType,
    pub target: String,
    pub current_value: f64,
    pub baseline_value: f64,
    /// Quantity compared against the threshold
    pub measured: f64,
    pub threshold: f64,
    pub breached: bool,
    pub active_alert: Option<AlertId>,
}

pub struct ProactiveMonitor {
    store: Arc<KnowledgeStore>,
    config: MonitorConfig,
    scheduler: Scheduler,
}

impl ProactiveMonitor {
    #[must_use]
    pub fn new(store: Arc<KnowledgeStore>, config: MonitorConfig, scheduler: Scheduler) -> Self {
        Self {
            store,
            config,
            scheduler,
        }
    }

    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Feed an observation; the first one for a pair becomes its baseline
    ///
    /// # Errors
    /// Returns `InvalidInput` for negative or non-finite values and empty targets
    pub fn record(
        &self,
        monitor_type: MonitorType,
        target: &str,
        value: f64,
    ) -> Result<MonitorMetric, MonitorError> {
        if !value.is_finite() || value < 0.0 {
            return Err(MonitorError::InvalidInput(format!(
                "{monitor_type} value must be a non-negative number, got {value}"
            )));
        }
        let target = target.trim();
        if target.is_empty() {
            return Err(MonitorError::InvalidInput("target must not be empty".into()));
        }
        let threshold = monitor_type.threshold(&self.config);

        self.store
            .update(Collection::Monitors, |state: &mut MonitorState| {
                let now = Utc::now();
                let metric = match state
                    .metrics
                    .iter_mut()
                    .find(|m| m.matches(monitor_type, target))
                {
                    Some(metric) => {
                        metric.current_value = value;
                        metric.threshold = threshold;
                        metric.updated_at = now;
                        metric.clone()
                    }
                    None => {
                        let metric = MonitorMetric {
                            monitor_type,
                            target: target.to_string(),
                            current_value: value,
                            baseline_value: value,
                            threshold,
                            updated_at: now,
                        };
                        debug!(monitor = %monitor_type, target, baseline = value, "baseline established");
                        state.metrics.push(metric.clone());
                        metric
                    }
                };
                Ok::<_, MonitorError>(metric)
            })
    }

    /// Re-baseline every metric at its current value and refresh thresholds
    ///
    /// # Errors
    /// Returns a store error
    pub fn init(&self) -> Result<Vec<MonitorMetric>, MonitorError> {
        let config = self.config.clone();
        let metrics = self
            .store
            .update(Collection::Monitors, |state: &mut MonitorState| {
                for metric in &mut state.metrics {
                    metric.baseline_value = metric.current_value;
                    metric.threshold = metric.monitor_type.threshold(&config);
                }
                Ok::<_, MonitorError>(state.metrics.clone())
            })?;
        info!(monitors = metrics.len(), "monitors initialized");
        Ok(metrics)
    }

    /// One evaluation pass over every monitor
    ///
    /// # Errors
    /// Returns a store error
    pub fn run(&self) -> Result<RunReport, MonitorError> {
        let report = self
            .store
            .update(Collection::Monitors, |state: &mut MonitorState| {
                let mut report = RunReport {
                    evaluated: state.metrics.len(),
                    ..RunReport::default()
                };
                let mut raised = Vec::new();
                for metric in state.metrics.iter().filter(|m| m.is_breached()) {
                    report.breached += 1;
                    if state.active_alert(metric.monitor_type, &metric.target).is_some() {
                        continue;
                    }
                    let alert = Alert {
                        id: AlertId::new(),
                        monitor_type: metric.monitor_type,
                        target: metric.target.clone(),
                        status: AlertStatus::Active,
                        message: format!(
                            "{} on {}: {:.2}{unit} exceeds threshold {:.2}{unit}",
                            metric.monitor_type,
                            metric.target,
                            metric.measure(),
                            metric.threshold,
                            unit = metric.monitor_type.unit(),
                        ),
                        raised_at: Utc::now(),
                        resolved_at: None,
                    };
                    warn!(
                        alert = %alert.id,
                        monitor = %alert.monitor_type,
                        target = %alert.target,
                        "{}",
                        alert.message
                    );
                    raised.push(alert);
                }
                state.alerts.extend(raised.iter().cloned());
                report.raised = raised;
                Ok::<_, MonitorError>(report)
            })?;
        debug!(
            evaluated = report.evaluated,
            breached = report.breached,
            raised = report.raised.len(),
            "monitor pass complete"
        );
        Ok(report)
    }

    /// Per-monitor current value against threshold
    ///
    /// # Errors
    /// Returns a store error
    pub fn status(&self) -> Result<Vec<MonitorStatus>, MonitorError> {
        let state = self.store.get::<MonitorState>(Collection::Monitors)?.data;
        Ok(state
            .metrics
            .iter()
            .map(|m| MonitorStatus {
                monitor_type: m.monitor_type,
                target: m.target.clone(),
                current_value: m.current_value,
                baseline_value: m.baseline_value,
                measured: m.measure(),
                threshold: m.threshold,
                breached: m.is_breached(),
                active_alert: state.active_alert(m.monitor_type, &m.target).map(|a| a.id),
            })
            .collect())
    }

    /// Active alerts
    ///
    /// # Errors
    /// Returns a store error
    pub fn alerts(&self) -> Result<Vec<Alert>, MonitorError> {
        let state = self.store.get::<MonitorState>(Collection::Monitors)?.data;
        Ok(state.alerts.into_iter().filter(Alert::is_active).collect())
    }

    /// Resolve an alert; resolving twice returns the already-resolved alert
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids
    pub fn resolve(&self, id: AlertId) -> Result<Alert, MonitorError> {
        self.store
            .update(Collection::Monitors, |state: &mut MonitorState| {
                let alert = state
                    .alerts
                    .iter_mut()
                    .find(|a| a.id == id)
                    .ok_or(MonitorError::NotFound(id))?;
                if alert.is_active() {
                    alert.status = AlertStatus::Resolved;
                    alert.resolved_at = Some(Utc::now());
                    info!(alert = %id, monitor = %alert.monitor_type, target = %alert.target, "alert resolved");
                }
                Ok::<_, MonitorError>(alert.clone())
            })
    }

    /// Start periodic passes on the scheduler
    pub fn start_watch(self: &Arc<Self>) -> TimerKey {
        let key = TimerKey::from(WATCH_TIMER);
        let monitor = Arc::clone(self);
        self.scheduler
            .schedule_every(key.clone(), self.config.interval(), move || {
                let monitor = Arc::clone(&monitor);
                async move {
                    if let Err(e) = blocking(move || monitor.run()).await {
                        error!(error = %e, "monitor pass failed");
                    }
                }
            });
        info!(interval_secs = self.config.interval_secs, "monitor watch started");
        key
    }

    /// Run a pass now, then every interval until `shutdown` completes
    ///
    /// A pass in progress when `shutdown` fires runs to completion.
    ///
    /// # Errors
    /// Returns the error of the initial pass
    pub async fn watch<S>(self: &Arc<Self>, shutdown: S) -> Result<(), MonitorError>
    where
        S: Future<Output = ()>,
    {
        let monitor = Arc::clone(self);
        blocking(move || monitor.run()).await?;
        let key = self.start_watch();
        shutdown.await;
        self.scheduler.cancel_and_wait(&key).await;
        info!("monitor watch stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ProactiveMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProactiveMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arp_core::StoreConfig;

    fn monitor() -> (tempfile::TempDir, ProactiveMonitor) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap());
        (
            dir,
            ProactiveMonitor::new(store, MonitorConfig::default(), Scheduler::new()),
        )
    }

    #[test]
    fn first_observation_is_baseline() {
        let (_dir, monitor) = monitor();
        let m = monitor.record(MonitorType::Coverage, "app", 80.0).unwrap();
        assert_eq!(m.baseline_value, 80.0);
        let m = monitor.record(MonitorType::Coverage, "app", 70.0).unwrap();
        assert_eq!(m.baseline_value, 80.0);
        assert_eq!(m.current_value, 70.0);
    }

    #[test]
    fn invalid_observations_rejected() {
        let (_dir, monitor) = monitor();
        assert!(monitor.record(MonitorType::ErrorRate, "app", -1.0).is_err());
        assert!(monitor.record(MonitorType::ErrorRate, "app", f64::NAN).is_err());
        assert!(monitor.record(MonitorType::ErrorRate, " ", 1.0).is_err());
    }

    #[test]
    fn breach_raises_one_alert_until_resolved() {
        let (_dir, monitor) = monitor();
        monitor.record(MonitorType::Complexity, "parser.rs", 22.0).unwrap();

        let first = monitor.run().unwrap();
        assert_eq!(first.raised.len(), 1);
        let second = monitor.run().unwrap();
        assert_eq!(second.breached, 1);
        assert!(second.raised.is_empty());
        assert_eq!(monitor.alerts().unwrap().len(), 1);

        // back within bounds: still active
        monitor.record(MonitorType::Complexity, "parser.rs", 3.0).unwrap();
        monitor.run().unwrap();
        assert_eq!(monitor.alerts().unwrap().len(), 1);

        let id = first.raised[0].id;
        let resolved = monitor.resolve(id).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        let again = monitor.resolve(id).unwrap();
        assert_eq!(again.resolved_at, resolved.resolved_at);
        assert!(monitor.alerts().unwrap().is_empty());

        // a later breach raises a fresh alert
        monitor.record(MonitorType::Complexity, "parser.rs", 40.0).unwrap();
        let third = monitor.run().unwrap();
        assert_eq!(third.raised.len(), 1);
        assert_ne!(third.raised[0].id, id);
    }

    #[test]
    fn init_rebaselines() {
        let (_dir, monitor) = monitor();
        monitor.record(MonitorType::BuildTime, "ci", 100.0).unwrap();
        monitor.record(MonitorType::BuildTime, "ci", 150.0).unwrap();
        assert!(monitor.status().unwrap()[0].breached);

        monitor.init().unwrap();
        let status = monitor.status().unwrap();
        assert_eq!(status[0].baseline_value, 150.0);
        assert!(!status[0].breached);
    }

    #[test]
    fn resolve_unknown_alert() {
        let (_dir, monitor) = monitor();
        let err = monitor.resolve(AlertId::new()).unwrap_err();
        assert_eq!(err.kind(), arp_core::ErrorKind::NotFound);
    }
}
