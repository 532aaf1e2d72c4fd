//! StrategyTracker

use crate::error::StrategyError;
use crate::model::{
    default_strategies, Adaptation, ContextStats, Execution, Strategy, StrategyRegistry,
};
use arp_core::StrategyConfig;
use arp_store::{Collection, KnowledgeStore};
use chrono::Utc;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Executions considered for the recent success rate
pub const RECENT_WINDOW: usize = 20;

/// Recent rate must move this far from the overall rate to count as a trend
const TREND_BAND: f64 = 0.1;

/// Why a strategy was ranked where it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    /// Enough samples in the context; ranked by success rate per second
    Performance,
    /// Too few samples; ranked by baseline risk
    BaselineRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub strategy_id: String,
    pub name: String,
    pub context: String,
    pub basis: Basis,
    pub score: f64,
    pub samples: u64,
    pub success_rate: f64,
    pub avg_time: f64,
    pub baseline_risk_estimate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub strategy_id: String,
    pub name: String,
    pub total_attempts: u64,
    pub success_rate: f64,
    pub recent_success_rate: f64,
    pub trend: Trend,
    pub avg_time: f64,
    pub adaptations: usize,
    pub steps: Vec<String>,
    pub contexts: BTreeMap<String, ContextStats>,
}

impl Performance {
    fn of(strategy: &Strategy, registry: &StrategyRegistry) -> Self {
        let totals = strategy.totals();
        let success_rate = totals.success_rate();
        let recent = registry.recent(&strategy.id, RECENT_WINDOW);
        let recent_success_rate = if recent.is_empty() {
            success_rate
        } else {
            recent.iter().filter(|e| e.success).count() as f64 / recent.len() as f64
        };
        let trend = if recent_success_rate > success_rate + TREND_BAND {
            Trend::Improving
        } else if recent_success_rate < success_rate - TREND_BAND {
            Trend::Declining
        } else {
            Trend::Stable
        };
        Self {
            strategy_id: strategy.id.clone(),
            name: strategy.name.clone(),
            total_attempts: totals.samples(),
            success_rate,
            recent_success_rate,
            trend,
            avg_time: totals.avg_time(),
            adaptations: strategy.adaptations.len(),
            steps: strategy.steps.clone(),
            contexts: strategy.stats.clone(),
        }
    }
}

/// Records strategy outcomes and recommends the best strategy per context
pub struct StrategyTracker {
    store: Arc<KnowledgeStore>,
    config: StrategyConfig,
    seed_defaults: bool,
}

impl StrategyTracker {
    #[must_use]
    pub fn new(store: Arc<KnowledgeStore>, config: StrategyConfig) -> Self {
        Self {
            store,
            config,
            seed_defaults: true,
        }
    }

    /// Start from an empty registry instead of the built-in strategies
    #[must_use]
    pub fn without_defaults(mut self) -> Self {
        self.seed_defaults = false;
        self
    }

    #[must_use]
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Add a strategy to the registry
    ///
    /// # Errors
    /// Returns `AlreadyRegistered` when the id is taken
    pub fn register(&self, strategy: Strategy) -> Result<Strategy, StrategyError> {
        self.mutate(|registry| register_into(registry, strategy))
    }

    /// Record one execution outcome
    ///
    /// # Errors
    /// Returns `UnknownStrategy` for unregistered ids and `InvalidInput` for
    /// an empty context or a negative elapsed time
    pub fn record(
        &self,
        strategy_id: &str,
        context: &str,
        success: bool,
        elapsed_secs: f64,
    ) -> Result<ContextStats, StrategyError> {
        let context = context.trim();
        if context.is_empty() {
            return Err(StrategyError::InvalidInput("context must not be empty".into()));
        }
        if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
            return Err(StrategyError::InvalidInput(format!(
                "elapsed time must be a non-negative number, got {elapsed_secs}"
            )));
        }
        let cap = self.config.history_cap;
        let stats = self.mutate(|registry| {
            let strategy = registry
                .find_mut(strategy_id)
                .ok_or_else(|| StrategyError::UnknownStrategy(strategy_id.to_string()))?;
            let stats = strategy.stats.entry(context.to_string()).or_default();
            stats.add(success, elapsed_secs);
            let stats = *stats;

            registry.executions.push(Execution {
                strategy_id: strategy_id.to_string(),
                context: context.to_string(),
                success,
                elapsed_secs,
                recorded_at: Utc::now(),
            });
            if registry.executions.len() > cap {
                let excess = registry.executions.len() - cap;
                registry.executions.drain(..excess);
            }
            Ok(stats)
        })?;
        debug!(strategy = strategy_id, context, success, elapsed_secs, "strategy outcome recorded");
        Ok(stats)
    }

    /// Best strategy for a context
    ///
    /// Strategies with at least `min_samples` in the context compete on
    /// success rate per second. When none qualifies, the lowest baseline risk
    /// wins, preferring strategies that declare the context.
    ///
    /// # Errors
    /// Returns `NoStrategyAvailable` only when the registry is empty
    pub fn best(&self, context: &str) -> Result<Recommendation, StrategyError> {
        self.recommend(context)?
            .into_iter()
            .next()
            .ok_or_else(|| StrategyError::NoStrategyAvailable {
                context: context.to_string(),
            })
    }

    /// Every strategy ranked for a context, best first
    ///
    /// # Errors
    /// Returns a store error
    pub fn recommend(&self, context: &str) -> Result<Vec<Recommendation>, StrategyError> {
        let registry = self.load()?;
        let min_samples = self.config.min_samples;
        let mut ranked: Vec<(&Strategy, Recommendation)> = registry
            .strategies
            .iter()
            .map(|s| {
                let stats = s.stats_for(context);
                let basis = if stats.samples() >= min_samples && stats.samples() > 0 {
                    Basis::Performance
                } else {
                    Basis::BaselineRisk
                };
                let rec = Recommendation {
                    strategy_id: s.id.clone(),
                    name: s.name.clone(),
                    context: context.to_string(),
                    basis,
                    score: stats.score(),
                    samples: stats.samples(),
                    success_rate: stats.success_rate(),
                    avg_time: stats.avg_time(),
                    baseline_risk_estimate: s.baseline_risk_estimate,
                };
                (s, rec)
            })
            .collect();
        ranked.sort_by(|(sa, a), (sb, b)| rank(context, sa, a, sb, b));
        Ok(ranked.into_iter().map(|(_, rec)| rec).collect())
    }

    /// Annotate a strategy with a manual change
    ///
    /// # Errors
    /// Returns `UnknownStrategy` for unregistered ids
    pub fn adapt(
        &self,
        strategy_id: &str,
        description: &str,
        impact: &str,
    ) -> Result<Adaptation, StrategyError> {
        let adaptation = self.mutate(|registry| {
            let strategy = registry
                .find_mut(strategy_id)
                .ok_or_else(|| StrategyError::UnknownStrategy(strategy_id.to_string()))?;
            let adaptation = Adaptation {
                description: description.to_string(),
                impact: impact.to_string(),
                success_rate_before: strategy.totals().success_rate(),
                recorded_at: Utc::now(),
            };
            strategy.adaptations.push(adaptation.clone());
            Ok(adaptation)
        })?;
        info!(strategy = strategy_id, impact, "strategy adapted");
        Ok(adaptation)
    }

    /// # Errors
    /// Returns `UnknownStrategy` for unregistered ids
    pub fn performance(&self, strategy_id: &str) -> Result<Performance, StrategyError> {
        let registry = self.load()?;
        let strategy = registry
            .find(strategy_id)
            .ok_or_else(|| StrategyError::UnknownStrategy(strategy_id.to_string()))?;
        Ok(Performance::of(strategy, &registry))
    }

    /// # Errors
    /// Returns a store error
    pub fn list(&self) -> Result<Vec<Performance>, StrategyError> {
        let registry = self.load()?;
        Ok(registry
            .strategies
            .iter()
            .map(|s| Performance::of(s, &registry))
            .collect())
    }

    /// Performance of several strategies, highest success rate first
    ///
    /// # Errors
    /// Returns `UnknownStrategy` if any id is unregistered
    pub fn compare(&self, ids: &[&str]) -> Result<Vec<Performance>, StrategyError> {
        let registry = self.load()?;
        let mut out = ids
            .iter()
            .map(|id| {
                registry
                    .find(id)
                    .map(|s| Performance::of(s, &registry))
                    .ok_or_else(|| StrategyError::UnknownStrategy((*id).to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        out.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.strategy_id.cmp(&b.strategy_id))
        });
        Ok(out)
    }

    /// A registered strategy
    ///
    /// # Errors
    /// Returns `UnknownStrategy` for unregistered ids
    pub fn get(&self, strategy_id: &str) -> Result<Strategy, StrategyError> {
        self.load()?
            .find(strategy_id)
            .cloned()
            .ok_or_else(|| StrategyError::UnknownStrategy(strategy_id.to_string()))
    }

    /// Read the registry, installing the defaults on first use
    fn load(&self) -> Result<StrategyRegistry, StrategyError> {
        let registry = self
            .store
            .get::<StrategyRegistry>(Collection::Strategies)?
            .data;
        if registry.seeded || !self.seed_defaults {
            return Ok(registry);
        }
        self.mutate(|registry| Ok(registry.clone()))
    }

    /// Locked read-modify-write of the registry
    fn mutate<R, F>(&self, f: F) -> Result<R, StrategyError>
    where
        F: FnOnce(&mut StrategyRegistry) -> Result<R, StrategyError>,
    {
        let seed = self.seed_defaults;
        self.store
            .update(Collection::Strategies, |registry: &mut StrategyRegistry| {
                if seed && !registry.seeded {
                    seed_into(registry);
                }
                f(registry)
            })
    }
}

impl std::fmt::Debug for StrategyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyTracker")
            .field("config", &self.config)
            .field("seed_defaults", &self.seed_defaults)
            .finish_non_exhaustive()
    }
}

pub(crate) fn register_into(
    registry: &mut StrategyRegistry,
    strategy: Strategy,
) -> Result<Strategy, StrategyError> {
    if strategy.id.trim().is_empty() {
        return Err(StrategyError::InvalidInput("strategy id must not be empty".into()));
    }
    if registry.find(&strategy.id).is_some() {
        return Err(StrategyError::AlreadyRegistered(strategy.id));
    }
    info!(strategy = %strategy.id, "strategy registered");
    registry.strategies.push(strategy.clone());
    Ok(strategy)
}

fn seed_into(registry: &mut StrategyRegistry) {
    for strategy in default_strategies() {
        if registry.find(&strategy.id).is_none() {
            registry.strategies.push(strategy);
        }
    }
    registry.seeded = true;
    info!(strategies = registry.strategies.len(), "default strategies installed");
}

/// Performance-qualified first, by score; the rest by declared context then
/// baseline risk; ids break ties
fn rank(context: &str, sa: &Strategy, a: &Recommendation, sb: &Strategy, b: &Recommendation) -> Ordering {
    match (a.basis, b.basis) {
        (Basis::Performance, Basis::BaselineRisk) => Ordering::Less,
        (Basis::BaselineRisk, Basis::Performance) => Ordering::Greater,
        (Basis::Performance, Basis::Performance) => b
            .score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.samples.cmp(&a.samples)),
        (Basis::BaselineRisk, Basis::BaselineRisk) => sb
            .declares(context)
            .cmp(&sa.declares(context))
            .then_with(|| {
                a.baseline_risk_estimate
                    .partial_cmp(&b.baseline_risk_estimate)
                    .unwrap_or(Ordering::Equal)
            }),
    }
    .then_with(|| a.strategy_id.cmp(&b.strategy_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arp_core::{ErrorKind, StoreConfig};

    fn tracker() -> (tempfile::TempDir, StrategyTracker) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap());
        (dir, StrategyTracker::new(store, StrategyConfig::default()))
    }

    #[test]
    fn defaults_installed_once() {
        let (_dir, tracker) = tracker();
        assert_eq!(tracker.list().unwrap().len(), 4);
        tracker
            .register(Strategy::new("custom", "Custom").with_steps(["a", "b"]))
            .unwrap();
        assert_eq!(tracker.list().unwrap().len(), 5);
    }

    #[test]
    fn record_unknown_strategy() {
        let (_dir, tracker) = tracker();
        let err = tracker.record("nope", "build_error", true, 1.0).unwrap_err();
        assert!(matches!(err, StrategyError::UnknownStrategy(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn record_rejects_bad_input() {
        let (_dir, tracker) = tracker();
        assert!(tracker.record("rebuild", "", true, 1.0).is_err());
        assert!(tracker.record("rebuild", "build_error", true, -1.0).is_err());
        assert!(tracker.record("rebuild", "build_error", true, f64::INFINITY).is_err());
    }

    #[test]
    fn fallback_prefers_declared_context() {
        let (_dir, tracker) = tracker();
        // run_tests ties rebuild on risk but only run_tests declares the context
        let best = tracker.best("regression").unwrap();
        assert_eq!(best.strategy_id, "run_tests");
        assert_eq!(best.basis, Basis::BaselineRisk);

        // nobody declares it: lowest risk, ties by id
        let best = tracker.best("lint_error").unwrap();
        assert_eq!(best.strategy_id, "rebuild");
    }

    #[test]
    fn qualified_strategy_beats_fallback() {
        let (_dir, tracker) = tracker();
        for _ in 0..3 {
            tracker.record("fix_imports", "build_error", true, 30.0).unwrap();
        }
        let best = tracker.best("build_error").unwrap();
        assert_eq!(best.strategy_id, "fix_imports");
        assert_eq!(best.basis, Basis::Performance);
    }

    #[test]
    fn below_minimum_does_not_count() {
        let (_dir, tracker) = tracker();
        tracker.record("fix_imports", "build_error", true, 1.0).unwrap();
        tracker.record("fix_imports", "build_error", true, 1.0).unwrap();
        assert_eq!(tracker.best("build_error").unwrap().strategy_id, "rebuild");
    }

    #[test]
    fn empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap());
        let tracker = StrategyTracker::new(store, StrategyConfig::default()).without_defaults();
        let err = tracker.best("build_error").unwrap_err();
        assert!(matches!(err, StrategyError::NoStrategyAvailable { .. }));
    }

    #[test]
    fn register_rejects_duplicates() {
        let (_dir, tracker) = tracker();
        let err = tracker.register(Strategy::new("rebuild", "Again")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn history_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap());
        let config = StrategyConfig {
            history_cap: 5,
            ..StrategyConfig::default()
        };
        let tracker = StrategyTracker::new(Arc::clone(&store), config);
        for i in 0..8 {
            tracker.record("rebuild", "build_error", true, f64::from(i)).unwrap();
        }
        let registry = store.get::<StrategyRegistry>(Collection::Strategies).unwrap().data;
        assert_eq!(registry.executions.len(), 5);
        assert_eq!(registry.executions[0].elapsed_secs, 3.0);
        // aggregates are not capped
        assert_eq!(tracker.performance("rebuild").unwrap().total_attempts, 8);
    }

    #[test]
    fn trend_follows_recent_window() {
        let (_dir, tracker) = tracker();
        for _ in 0..30 {
            tracker.record("rebuild", "build_error", false, 10.0).unwrap();
        }
        for _ in 0..20 {
            tracker.record("rebuild", "build_error", true, 10.0).unwrap();
        }
        let perf = tracker.performance("rebuild").unwrap();
        assert!((perf.success_rate - 0.4).abs() < 1e-9);
        assert_eq!(perf.recent_success_rate, 1.0);
        assert_eq!(perf.trend, Trend::Improving);

        let idle = tracker.performance("clean_build").unwrap();
        assert_eq!(idle.trend, Trend::Stable);
        assert_eq!(idle.total_attempts, 0);
    }

    #[test]
    fn adapt_captures_rate_before() {
        let (_dir, tracker) = tracker();
        tracker.record("rebuild", "build_error", true, 10.0).unwrap();
        tracker.record("rebuild", "build_error", false, 10.0).unwrap();
        let adaptation = tracker.adapt("rebuild", "add cache warmup", "medium").unwrap();
        assert_eq!(adaptation.success_rate_before, 0.5);
        assert_eq!(tracker.performance("rebuild").unwrap().adaptations, 1);
        assert!(tracker.adapt("ghost", "x", "y").is_err());
    }

    #[test]
    fn compare_sorts_by_success_rate() {
        let (_dir, tracker) = tracker();
        tracker.record("rebuild", "build_error", false, 10.0).unwrap();
        tracker.record("clean_build", "build_error", true, 10.0).unwrap();
        let ranked = tracker.compare(&["rebuild", "clean_build"]).unwrap();
        assert_eq!(ranked[0].strategy_id, "clean_build");
        assert!(tracker.compare(&["rebuild", "ghost"]).is_err());
    }
}
