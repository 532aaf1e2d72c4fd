//! StrategyEvolution: mutated variants and A/B experiments
//!
//! An experiment runs a base strategy against one mutated variant in a
//! context. Once both buckets hold `sample_size` results the experiment
//! completes; a winning variant is registered with the tracker carrying
//! its lineage.

use crate::error::StrategyError;
use crate::model::{Lineage, Strategy};
use crate::mutation::Mutation;
use crate::tracker::StrategyTracker;
use arp_core::ExperimentId;
use arp_store::Collection;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

const SUCCESS_WEIGHT: f64 = 0.6;
const SPEED_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Base,
    Variant,
}

impl Bucket {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Variant => "variant",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "variant" => Ok(Self::Variant),
            _ => Err(StrategyError::InvalidBucket(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub success: bool,
    pub elapsed_secs: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketResults {
    pub results: Vec<Trial>,
    pub success_count: u64,
    pub total_time: f64,
}

impl BucketResults {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.success_count as f64 / self.results.len() as f64
        }
    }

    #[must_use]
    pub fn avg_time(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.total_time / self.results.len() as f64
        }
    }

    fn push(&mut self, success: bool, elapsed_secs: f64) {
        if success {
            self.success_count += 1;
        }
        self.total_time += elapsed_secs;
        self.results.push(Trial {
            success,
            elapsed_secs,
            recorded_at: Utc::now(),
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buckets {
    pub base: BucketResults,
    pub variant: BucketResults,
}

impl Buckets {
    fn get_mut(&mut self, bucket: Bucket) -> &mut BucketResults {
        match bucket {
            Bucket::Base => &mut self.base,
            Bucket::Variant => &mut self.variant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub base: f64,
    pub variant: f64,
}

impl Scores {
    /// `0.6 * successRate + 0.4 * (1 - avgTime / max(avgTimes))` per bucket
    #[must_use]
    pub fn of(buckets: &Buckets) -> Self {
        let slowest = buckets.base.avg_time().max(buckets.variant.avg_time());
        let score = |b: &BucketResults| {
            let speed = if slowest > 0.0 {
                1.0 - b.avg_time() / slowest
            } else {
                1.0
            };
            SUCCESS_WEIGHT * b.success_rate() + SPEED_WEIGHT * speed
        };
        Self {
            base: score(&buckets.base),
            variant: score(&buckets.variant),
        }
    }

    /// The variant wins only by beating the base and reaching `base * margin`
    #[must_use]
    pub fn winner(&self, margin: f64) -> Bucket {
        if self.variant > self.base && self.variant >= self.base * margin {
            Bucket::Variant
        } else {
            Bucket::Base
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentState {
    Running,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: ExperimentId,
    pub strategy_id: String,
    pub context: String,
    pub sample_size: u32,
    /// Candidate under test; registered only if it wins
    pub variant: Strategy,
    pub mutation: Mutation,
    pub buckets: Buckets,
    pub status: ExperimentState,
    #[serde(default)]
    pub winner: Option<Bucket>,
    #[serde(default)]
    pub scores: Option<Scores>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Experiment {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == ExperimentState::Complete
    }

    #[must_use]
    pub fn has_enough_samples(&self) -> bool {
        let needed = self.sample_size as usize;
        self.buckets.base.len() >= needed && self.buckets.variant.len() >= needed
    }
}

/// A variant that beat its parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub experiment_id: ExperimentId,
    pub parent: String,
    pub strategy_id: String,
    pub context: String,
    pub mutation: Mutation,
    pub base_score: f64,
    pub variant_score: f64,
    pub promoted_at: DateTime<Utc>,
}

/// Contents of the `evolution` collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionState {
    pub experiments: Vec<Experiment>,
    pub promotions: Vec<Promotion>,
}

/// Live view of an experiment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentReport {
    #[serde(flatten)]
    pub experiment: Experiment,
    /// Scores over the results so far
    pub current_scores: Scores,
    pub base_samples: usize,
    pub variant_samples: usize,
}

impl From<Experiment> for ExperimentReport {
    fn from(experiment: Experiment) -> Self {
        Self {
            current_scores: Scores::of(&experiment.buckets),
            base_samples: experiment.buckets.base.len(),
            variant_samples: experiment.buckets.variant.len(),
            experiment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionHistory {
    pub total_promotions: usize,
    pub mutation_type_frequency: BTreeMap<String, usize>,
    pub promotions: Vec<Promotion>,
}

pub struct StrategyEvolution {
    tracker: Arc<StrategyTracker>,
    rng: Mutex<StdRng>,
}

impl StrategyEvolution {
    /// Seeded from `strategy.evolution_seed` when configured
    #[must_use]
    pub fn new(tracker: Arc<StrategyTracker>) -> Self {
        let rng = match tracker.config().evolution_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            tracker,
            rng: Mutex::new(rng),
        }
    }

    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// A mutated copy of a registered strategy; not registered
    ///
    /// # Errors
    /// Returns `UnknownStrategy` for unregistered ids
    pub fn variant(&self, strategy_id: &str) -> Result<Strategy, StrategyError> {
        self.spawn(strategy_id).map(|(variant, _)| variant)
    }

    fn spawn(&self, strategy_id: &str) -> Result<(Strategy, Mutation), StrategyError> {
        let base = self.tracker.get(strategy_id)?;
        let mutation = Mutation::pick(&mut *self.rng.lock(), &base);

        let mut variant = base.clone();
        mutation.apply(&mut variant);
        variant.id = format!(
            "{}-{}",
            base.id,
            ulid::Ulid::new().to_string().to_ascii_lowercase()
        );
        variant.name = format!("{} ({})", base.name, mutation.kind());
        variant.description = mutation.describe();
        variant.stats.clear();
        variant.adaptations.clear();
        variant.created_at = Utc::now();
        variant.lineage = Some(Lineage {
            parent: base.id,
            mutation: mutation.clone(),
        });
        debug!(variant = %variant.id, mutation = %mutation.kind(), "variant generated");
        Ok((variant, mutation))
    }

    /// Start an A/B experiment of a strategy against a fresh variant
    ///
    /// # Errors
    /// Returns `UnknownStrategy` for unregistered ids and `InvalidInput` for
    /// a zero sample size or empty context
    pub fn create_test(
        &self,
        strategy_id: &str,
        context: &str,
        sample_size: Option<u32>,
    ) -> Result<Experiment, StrategyError> {
        let sample_size = sample_size.unwrap_or(self.tracker.config().default_sample_size);
        if sample_size == 0 {
            return Err(StrategyError::InvalidInput("sample size must be positive".into()));
        }
        let context = context.trim();
        if context.is_empty() {
            return Err(StrategyError::InvalidInput("context must not be empty".into()));
        }
        let (variant, mutation) = self.spawn(strategy_id)?;
        let experiment = Experiment {
            id: ExperimentId::new(),
            strategy_id: strategy_id.to_string(),
            context: context.to_string(),
            sample_size,
            variant,
            mutation,
            buckets: Buckets::default(),
            status: ExperimentState::Running,
            winner: None,
            scores: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.tracker
            .store()
            .update(Collection::Evolution, |state: &mut EvolutionState| {
                state.experiments.push(experiment.clone());
                Ok::<_, StrategyError>(())
            })?;
        info!(
            experiment = %experiment.id,
            strategy = strategy_id,
            context,
            mutation = %experiment.mutation.kind(),
            sample_size,
            "experiment started"
        );
        Ok(experiment)
    }

    /// Add one result to a bucket, completing the experiment when both are full
    ///
    /// # Errors
    /// Returns `ExperimentNotFound`, `ExperimentComplete`, or `InvalidInput`
    /// for a negative elapsed time
    pub fn record(
        &self,
        id: ExperimentId,
        bucket: Bucket,
        success: bool,
        elapsed_secs: f64,
    ) -> Result<ExperimentReport, StrategyError> {
        if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
            return Err(StrategyError::InvalidInput(format!(
                "elapsed time must be a non-negative number, got {elapsed_secs}"
            )));
        }
        let margin = self.tracker.config().promotion_margin;
        let experiment = self
            .tracker
            .store()
            .update(Collection::Evolution, |state: &mut EvolutionState| {
                let experiment = state
                    .experiments
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or(StrategyError::ExperimentNotFound(id))?;
                if experiment.is_complete() {
                    return Err(StrategyError::ExperimentComplete(id));
                }
                experiment.buckets.get_mut(bucket).push(success, elapsed_secs);
                if !experiment.has_enough_samples() {
                    return Ok(experiment.clone());
                }

                let scores = Scores::of(&experiment.buckets);
                let winner = scores.winner(margin);
                if winner == Bucket::Variant {
                    // a failed registration aborts the whole update
                    self.tracker.register(experiment.variant.clone())?;
                    state.promotions.push(Promotion {
                        experiment_id: id,
                        parent: experiment.strategy_id.clone(),
                        strategy_id: experiment.variant.id.clone(),
                        context: experiment.context.clone(),
                        mutation: experiment.mutation.clone(),
                        base_score: scores.base,
                        variant_score: scores.variant,
                        promoted_at: Utc::now(),
                    });
                }
                experiment.status = ExperimentState::Complete;
                experiment.winner = Some(winner);
                experiment.scores = Some(scores);
                experiment.completed_at = Some(Utc::now());
                info!(
                    experiment = %id,
                    %winner,
                    base_score = scores.base,
                    variant_score = scores.variant,
                    "experiment complete"
                );
                Ok(experiment.clone())
            })?;
        Ok(experiment.into())
    }

    /// # Errors
    /// Returns `ExperimentNotFound` for unknown ids
    pub fn status(&self, id: ExperimentId) -> Result<ExperimentReport, StrategyError> {
        self.state()?
            .experiments
            .into_iter()
            .find(|e| e.id == id)
            .map(ExperimentReport::from)
            .ok_or(StrategyError::ExperimentNotFound(id))
    }

    /// Running experiments
    ///
    /// # Errors
    /// Returns a store error
    pub fn list(&self) -> Result<Vec<Experiment>, StrategyError> {
        Ok(self
            .state()?
            .experiments
            .into_iter()
            .filter(|e| !e.is_complete())
            .collect())
    }

    /// Promotions with mutation frequency
    ///
    /// # Errors
    /// Returns a store error
    pub fn history(&self) -> Result<EvolutionHistory, StrategyError> {
        let promotions = self.state()?.promotions;
        let mut mutation_type_frequency = BTreeMap::new();
        for promotion in &promotions {
            *mutation_type_frequency
                .entry(promotion.mutation.kind().as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(EvolutionHistory {
            total_promotions: promotions.len(),
            mutation_type_frequency,
            promotions,
        })
    }

    fn state(&self) -> Result<EvolutionState, StrategyError> {
        Ok(self
            .tracker
            .store()
            .get::<EvolutionState>(Collection::Evolution)?
            .data)
    }
}

impl fmt::Debug for StrategyEvolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyEvolution")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arp_core::{ErrorKind, StoreConfig, StrategyConfig};
    use arp_store::KnowledgeStore;

    fn evolution() -> (tempfile::TempDir, StrategyEvolution) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap());
        let tracker = Arc::new(StrategyTracker::new(store, StrategyConfig::default()));
        (dir, StrategyEvolution::new(tracker).with_seed(11))
    }

    fn buckets(base: &[(bool, f64)], variant: &[(bool, f64)]) -> Buckets {
        let mut b = Buckets::default();
        for (s, t) in base {
            b.base.push(*s, *t);
        }
        for (s, t) in variant {
            b.variant.push(*s, *t);
        }
        b
    }

    #[test]
    fn score_formula() {
        let scores = Scores::of(&buckets(&[(true, 100.0), (false, 100.0)], &[(true, 50.0)]));
        assert!((scores.base - 0.3).abs() < 1e-9);
        assert!((scores.variant - 0.8).abs() < 1e-9);
        assert_eq!(scores.winner(1.05), Bucket::Variant);
    }

    #[test]
    fn variant_needs_margin() {
        let scores = Scores { base: 0.8, variant: 0.83 };
        assert_eq!(scores.winner(1.05), Bucket::Base);
        let scores = Scores { base: 0.8, variant: 0.84 };
        assert_eq!(scores.winner(1.05), Bucket::Variant);
    }

    #[test]
    fn bucket_parse() {
        assert_eq!("Variant".parse::<Bucket>().unwrap(), Bucket::Variant);
        let err = "control".parse::<Bucket>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn variant_has_lineage_and_is_unregistered() {
        let (_dir, evolution) = evolution();
        let variant = evolution.variant("rebuild").unwrap();
        let lineage = variant.lineage.as_ref().unwrap();
        assert_eq!(lineage.parent, "rebuild");
        assert!(variant.id.starts_with("rebuild-"));
        assert!(variant.stats.is_empty());
        assert!(evolution.tracker.get(&variant.id).is_err());
    }

    #[test]
    fn unknown_strategy_cannot_be_tested() {
        let (_dir, evolution) = evolution();
        let err = evolution.create_test("ghost", "build_error", None).unwrap_err();
        assert!(matches!(err, StrategyError::UnknownStrategy(_)));
        assert!(evolution.create_test("rebuild", "build_error", Some(0)).is_err());
    }

    #[test]
    fn default_sample_size() {
        let (_dir, evolution) = evolution();
        let exp = evolution.create_test("rebuild", "build_error", None).unwrap();
        assert_eq!(exp.sample_size, 20);
        assert_eq!(evolution.list().unwrap().len(), 1);
    }

    #[test]
    fn base_win_is_not_promoted() {
        let (_dir, evolution) = evolution();
        let exp = evolution.create_test("clean_build", "cache_issue", Some(1)).unwrap();
        evolution.record(exp.id, Bucket::Base, true, 10.0).unwrap();
        let report = evolution.record(exp.id, Bucket::Variant, false, 10.0).unwrap();
        assert_eq!(report.experiment.winner, Some(Bucket::Base));
        assert!(evolution.history().unwrap().promotions.is_empty());
        assert!(evolution.list().unwrap().is_empty());
        assert!(evolution.tracker.get(&exp.variant.id).is_err());
    }

    #[test]
    fn complete_experiment_rejects_results() {
        let (_dir, evolution) = evolution();
        let exp = evolution.create_test("rebuild", "build_error", Some(1)).unwrap();
        evolution.record(exp.id, Bucket::Base, true, 10.0).unwrap();
        evolution.record(exp.id, Bucket::Variant, true, 10.0).unwrap();
        let err = evolution.record(exp.id, Bucket::Base, true, 1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyComplete);

        let err = evolution.status(ExperimentId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn one_full_bucket_keeps_running() {
        let (_dir, evolution) = evolution();
        let exp = evolution.create_test("rebuild", "build_error", Some(2)).unwrap();
        for _ in 0..4 {
            evolution.record(exp.id, Bucket::Base, true, 10.0).unwrap();
        }
        let report = evolution.status(exp.id).unwrap();
        assert!(!report.experiment.is_complete());
        assert_eq!(report.base_samples, 4);
        assert_eq!(report.variant_samples, 0);
    }
}
