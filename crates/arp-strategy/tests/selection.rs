//! Strategy selection and experiment lifecycle against a real store

use arp_core::{StoreConfig, StrategyConfig};
use arp_store::KnowledgeStore;
use arp_strategy::{Basis, Bucket, ExperimentState, StrategyEvolution, StrategyTracker};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn tracker(dir: &tempfile::TempDir) -> Arc<StrategyTracker> {
    let store = Arc::new(KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap());
    Arc::new(StrategyTracker::new(store, StrategyConfig::default()))
}

#[test]
fn recorded_successes_make_rebuild_best() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = tracker(&dir);
    for _ in 0..3 {
        tracker.record("rebuild", "build_error", true, 58.3).unwrap();
    }
    let best = tracker.best("build_error").unwrap();
    assert_eq!(best.strategy_id, "rebuild");
    assert_eq!(best.basis, Basis::Performance);
    assert_eq!(best.samples, 3);

    let ranked = tracker.recommend("build_error").unwrap();
    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0].strategy_id, "rebuild");
}

#[test]
fn faster_variant_wins_and_is_promoted() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = tracker(&dir);
    let evolution = StrategyEvolution::new(Arc::clone(&tracker)).with_seed(5);

    let exp = evolution.create_test("rebuild", "build_error", Some(2)).unwrap();
    evolution.record(exp.id, Bucket::Base, true, 55.2).unwrap();
    evolution.record(exp.id, Bucket::Base, true, 55.2).unwrap();
    evolution.record(exp.id, Bucket::Variant, true, 48.7).unwrap();
    let report = evolution.record(exp.id, Bucket::Variant, true, 48.7).unwrap();

    assert_eq!(report.experiment.status, ExperimentState::Complete);
    assert_eq!(report.experiment.winner, Some(Bucket::Variant));
    let scores = report.experiment.scores.unwrap();
    assert!((scores.base - 0.6).abs() < 1e-9);
    assert!(scores.variant >= scores.base * 1.05);

    let promoted = tracker.get(&exp.variant.id).unwrap();
    let lineage = promoted.lineage.unwrap();
    assert_eq!(lineage.parent, "rebuild");
    assert_eq!(lineage.mutation, exp.mutation);

    let history = evolution.history().unwrap();
    assert_eq!(history.total_promotions, 1);
    assert_eq!(history.promotions[0].experiment_id, exp.id);
    assert_eq!(
        history.mutation_type_frequency.get(exp.mutation.kind().as_str()),
        Some(&1)
    );
    assert!(evolution.list().unwrap().is_empty());
}

#[test]
fn variant_failing_every_run_is_not_promoted() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = tracker(&dir);
    let evolution = StrategyEvolution::new(Arc::clone(&tracker)).with_seed(5);

    let exp = evolution.create_test("rebuild", "build_error", Some(2)).unwrap();
    for _ in 0..2 {
        evolution.record(exp.id, Bucket::Base, false, 50.0).unwrap();
    }
    evolution.record(exp.id, Bucket::Variant, false, 50.0).unwrap();
    let report = evolution.record(exp.id, Bucket::Variant, false, 50.0).unwrap();

    assert_eq!(report.experiment.status, ExperimentState::Complete);
    assert_eq!(report.experiment.winner, Some(Bucket::Base));
    assert!(tracker.get(&exp.variant.id).is_err());
    assert_eq!(evolution.history().unwrap().total_promotions, 0);
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let tracker = tracker(&dir);
        tracker.record("fix_imports", "import_error", false, 12.0).unwrap();
    }
    let tracker = tracker(&dir);
    let perf = tracker.performance("fix_imports").unwrap();
    assert_eq!(perf.total_attempts, 1);
    assert_eq!(perf.success_rate, 0.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// A strategy below the sample minimum is only picked when nothing qualifies
    #[test]
    fn best_respects_sample_minimum(
        fast_runs in 0u64..6,
        slow_runs in 0u64..6,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);
        // fix_imports would dominate on score, run_tests is slow
        for _ in 0..fast_runs {
            tracker.record("fix_imports", "build_error", true, 1.0).unwrap();
        }
        for _ in 0..slow_runs {
            tracker.record("run_tests", "build_error", true, 500.0).unwrap();
        }
        let best = tracker.best("build_error").unwrap();
        let expected = match (fast_runs >= 3, slow_runs >= 3) {
            (true, _) => "fix_imports",
            (false, true) => "run_tests",
            (false, false) => "rebuild",
        };
        prop_assert_eq!(best.strategy_id.as_str(), expected);
    }
}
