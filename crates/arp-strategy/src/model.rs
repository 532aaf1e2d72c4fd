//! Strategy registry documents

use crate::mutation::Mutation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Floor for average times when scoring, so instant runs don't divide by zero
pub const MIN_AVG_TIME: f64 = 1e-3;

/// Per-context outcome aggregates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_time: f64,
}

impl ContextStats {
    #[inline]
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.success_count + self.failure_count
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => self.success_count as f64 / n as f64,
        }
    }

    #[must_use]
    pub fn avg_time(&self) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => self.total_time / n as f64,
        }
    }

    /// Success rate per unit of average time
    #[must_use]
    pub fn score(&self) -> f64 {
        self.success_rate() / self.avg_time().max(MIN_AVG_TIME)
    }

    pub(crate) fn add(&mut self, success: bool, elapsed: f64) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.total_time += elapsed;
    }

    pub(crate) fn merge(&mut self, other: &ContextStats) {
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
        self.total_time += other.total_time;
    }
}

/// Free-form note attached to a strategy by `adapt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adaptation {
    pub description: String,
    pub impact: String,
    pub success_rate_before: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Where a promoted strategy came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub parent: String,
    pub mutation: Mutation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Contexts the strategy declares itself suitable for
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    pub baseline_risk_estimate: f64,
    /// Seconds
    pub baseline_duration_estimate: f64,
    #[serde(default)]
    pub stats: BTreeMap<String, ContextStats>,
    #[serde(default)]
    pub adaptations: Vec<Adaptation>,
    #[serde(default)]
    pub lineage: Option<Lineage>,
    pub created_at: DateTime<Utc>,
}

impl Strategy {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            contexts: Vec::new(),
            steps: Vec::new(),
            baseline_risk_estimate: 0.5,
            baseline_duration_estimate: 60.0,
            stats: BTreeMap::new(),
            adaptations: Vec::new(),
            lineage: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_baseline(mut self, risk: f64, duration_secs: f64) -> Self {
        self.baseline_risk_estimate = risk;
        self.baseline_duration_estimate = duration_secs;
        self
    }

    #[must_use]
    pub fn declares(&self, context: &str) -> bool {
        self.contexts.iter().any(|c| c == context)
    }

    /// Aggregates for one context; zeroed when never recorded
    #[must_use]
    pub fn stats_for(&self, context: &str) -> ContextStats {
        self.stats.get(context).copied().unwrap_or_default()
    }

    /// Aggregates summed over every context
    #[must_use]
    pub fn totals(&self) -> ContextStats {
        let mut total = ContextStats::default();
        for stats in self.stats.values() {
            total.merge(stats);
        }
        total
    }
}

/// One `record` call, kept for recent-performance trends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub strategy_id: String,
    pub context: String,
    pub success: bool,
    pub elapsed_secs: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Contents of the `strategies` collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyRegistry {
    /// Set once the default strategies have been installed
    pub seeded: bool,
    pub strategies: Vec<Strategy>,
    pub executions: Vec<Execution>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Strategy> {
        self.strategies.iter_mut().find(|s| s.id == id)
    }

    /// The most recent executions of one strategy, oldest first
    pub fn recent(&self, id: &str, n: usize) -> Vec<&Execution> {
        let mut recent: Vec<&Execution> = self
            .executions
            .iter()
            .rev()
            .filter(|e| e.strategy_id == id)
            .take(n)
            .collect();
        recent.reverse();
        recent
    }
}

/// Built-in strategies installed on first use
#[must_use]
pub fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new("rebuild", "Rebuild Project")
            .with_description("Clean and rebuild the project")
            .with_contexts(["build_error", "compile_error"])
            .with_steps(["clean", "build"])
            .with_baseline(0.1, 60.0),
        Strategy::new("clean_build", "Clean Build")
            .with_description("Remove build artifacts and caches before building")
            .with_contexts(["dependency_issue", "cache_issue"])
            .with_steps(["remove_artifacts", "resolve_dependencies", "build"])
            .with_baseline(0.2, 90.0),
        Strategy::new("fix_imports", "Fix Import Statements")
            .with_description("Analyze and repair import statements")
            .with_contexts(["import_error", "missing_module"])
            .with_steps(["scan_imports", "rewrite_imports", "build"])
            .with_baseline(0.3, 40.0),
        Strategy::new("run_tests", "Run Test Suite")
            .with_description("Run the test suite to surface regressions")
            .with_contexts(["test_failure", "regression"])
            .with_steps(["build", "run_tests"])
            .with_baseline(0.1, 180.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_rates() {
        let mut stats = ContextStats::default();
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.avg_time(), 0.0);

        stats.add(true, 10.0);
        stats.add(false, 30.0);
        assert_eq!(stats.samples(), 2);
        assert_eq!(stats.success_rate(), 0.5);
        assert_eq!(stats.avg_time(), 20.0);
        assert!((stats.score() - 0.025).abs() < 1e-12);
    }

    #[test]
    fn zero_time_score_is_finite() {
        let mut stats = ContextStats::default();
        stats.add(true, 0.0);
        assert!(stats.score().is_finite());
    }

    #[test]
    fn recent_keeps_order() {
        let mut registry = StrategyRegistry::default();
        for (i, id) in ["a", "b", "a", "a"].iter().enumerate() {
            registry.executions.push(Execution {
                strategy_id: (*id).to_string(),
                context: "ctx".into(),
                success: i % 2 == 0,
                elapsed_secs: i as f64,
                recorded_at: Utc::now(),
            });
        }
        let recent = registry.recent("a", 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].elapsed_secs, 2.0);
        assert_eq!(recent[1].elapsed_secs, 3.0);
    }

    #[test]
    fn defaults_have_distinct_ids() {
        let defaults = default_strategies();
        let mut ids: Vec<_> = defaults.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), defaults.len());
        assert!(defaults.iter().all(|s| s.steps.len() >= 2));
    }
}
