//! Experiment winner rule

use arp_strategy::{Bucket, Buckets, Scores};
use proptest::prelude::*;

proptest! {
    #[test]
    fn completion_never_yields_no_winner(base in 0.0f64..1.0, variant in 0.0f64..1.0) {
        let scores = Scores { base, variant };
        let winner = scores.winner(1.05);
        prop_assert_eq!(winner == Bucket::Variant, variant > base && variant >= base * 1.05);
    }

    #[test]
    fn scores_stay_in_unit_range(
        base_ok in 0usize..5,
        base_fail in 0usize..5,
        variant_ok in 0usize..5,
        variant_fail in 0usize..5,
        base_time in 0.0f64..300.0,
        variant_time in 0.0f64..300.0,
    ) {
        let json = serde_json::json!({
            "base": bucket(base_ok, base_fail, base_time),
            "variant": bucket(variant_ok, variant_fail, variant_time),
        });
        let buckets: Buckets = serde_json::from_value(json).unwrap();
        let scores = Scores::of(&buckets);
        prop_assert!((0.0..=1.0).contains(&scores.base));
        prop_assert!((0.0..=1.0).contains(&scores.variant));
    }
}

#[test]
fn equal_zero_scores_keep_the_base() {
    let scores = Scores {
        base: 0.0,
        variant: 0.0,
    };
    assert_eq!(scores.winner(1.05), Bucket::Base);
    let tied = Scores {
        base: 0.5,
        variant: 0.5,
    };
    assert_eq!(tied.winner(1.0), Bucket::Base);
}

fn bucket(ok: usize, fail: usize, time: f64) -> serde_json::Value {
    let results: Vec<_> = (0..ok + fail)
        .map(|i| {
            serde_json::json!({
                "success": i < ok,
                "elapsedSecs": time,
                "recordedAt": "2026-01-01T00:00:00Z",
            })
        })
        .collect();
    serde_json::json!({
        "results": results,
        "successCount": ok,
        "totalTime": time * (ok + fail) as f64,
    })
}
