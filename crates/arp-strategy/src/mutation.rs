//! Strategy mutations

use crate::model::Strategy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const PRE_STEPS: [&str; 3] = ["validate_environment", "check_dependencies", "backup_state"];
const POST_STEPS: [&str; 3] = ["verify_result", "run_smoke_test", "check_logs"];
const VALIDATION_STEP: &str = "validate_intermediate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    AdjustTiming,
    AddPreStep,
    AddPostStep,
    ChangeOrder,
    AddValidation,
}

impl MutationKind {
    pub const ALL: [MutationKind; 5] = [
        Self::AdjustTiming,
        Self::AddPreStep,
        Self::AddPostStep,
        Self::ChangeOrder,
        Self::AddValidation,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdjustTiming => "adjust_timing",
            Self::AddPreStep => "add_pre_step",
            Self::AddPostStep => "add_post_step",
            Self::ChangeOrder => "change_order",
            Self::AddValidation => "add_validation",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single concrete change to a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// Scale the duration estimate
    AdjustTiming { factor: f64 },
    AddPreStep { step: String },
    AddPostStep { step: String },
    /// Rotate the step list left by `shift`
    ChangeOrder { shift: usize },
    /// Insert a validation step before index `at`
    AddValidation { at: usize },
}

impl Mutation {
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::AdjustTiming { .. } => MutationKind::AdjustTiming,
            Self::AddPreStep { .. } => MutationKind::AddPreStep,
            Self::AddPostStep { .. } => MutationKind::AddPostStep,
            Self::ChangeOrder { .. } => MutationKind::ChangeOrder,
            Self::AddValidation { .. } => MutationKind::AddValidation,
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::AdjustTiming { factor } => format!("scale duration by {factor:.2}"),
            Self::AddPreStep { step } => format!("run {step} first"),
            Self::AddPostStep { step } => format!("run {step} last"),
            Self::ChangeOrder { shift } => format!("rotate steps by {shift}"),
            Self::AddValidation { at } => format!("validate before step {at}"),
        }
    }

    /// Pick one mutation that changes `base` observably
    pub fn pick<R: Rng>(rng: &mut R, base: &Strategy) -> Self {
        let kind = MutationKind::ALL
            .choose(rng)
            .copied()
            .unwrap_or(MutationKind::AdjustTiming);
        let unused = |candidates: &[&'static str]| -> Vec<&'static str> {
            candidates
                .iter()
                .copied()
                .filter(|s| !base.steps.iter().any(|step| step == s))
                .collect()
        };
        match kind {
            MutationKind::AddPreStep => {
                if let Some(step) = unused(&PRE_STEPS).choose(rng) {
                    return Self::AddPreStep {
                        step: (*step).to_string(),
                    };
                }
            }
            MutationKind::AddPostStep => {
                if let Some(step) = unused(&POST_STEPS).choose(rng) {
                    return Self::AddPostStep {
                        step: (*step).to_string(),
                    };
                }
            }
            MutationKind::ChangeOrder if base.steps.len() > 1 => {
                return Self::ChangeOrder {
                    shift: rng.gen_range(1..base.steps.len()),
                };
            }
            MutationKind::ChangeOrder => {}
            MutationKind::AddValidation => {
                return Self::AddValidation {
                    at: rng.gen_range(0..=base.steps.len()),
                };
            }
            MutationKind::AdjustTiming => {}
        }
        Self::AdjustTiming {
            factor: adjust_factor(rng),
        }
    }

    /// Apply to a strategy in place
    pub fn apply(&self, strategy: &mut Strategy) {
        match self {
            Self::AdjustTiming { factor } => {
                strategy.baseline_duration_estimate *= factor;
            }
            Self::AddPreStep { step } => strategy.steps.insert(0, step.clone()),
            Self::AddPostStep { step } => strategy.steps.push(step.clone()),
            Self::ChangeOrder { shift } => {
                if !strategy.steps.is_empty() {
                    let len = strategy.steps.len();
                    strategy.steps.rotate_left(shift % len);
                }
            }
            Self::AddValidation { at } => {
                let at = (*at).min(strategy.steps.len());
                strategy.steps.insert(at, VALIDATION_STEP.to_string());
            }
        }
    }
}

/// Uniform in [0.8, 1.2], never exactly 1
fn adjust_factor<R: Rng>(rng: &mut R) -> f64 {
    let factor = (rng.gen_range(0.8..=1.2_f64) * 100.0).round() / 100.0;
    if (factor - 1.0).abs() < f64::EPSILON {
        1.1
    } else {
        factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn base() -> Strategy {
        Strategy::new("rebuild", "Rebuild").with_steps(["clean", "build"])
    }

    #[test]
    fn every_pick_changes_the_strategy() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let original = base();
            let mutation = Mutation::pick(&mut rng, &original);
            let mut mutated = original.clone();
            mutation.apply(&mut mutated);
            assert!(
                mutated.steps != original.steps
                    || mutated.baseline_duration_estimate != original.baseline_duration_estimate,
                "{mutation:?} was a no-op"
            );
        }
    }

    #[test]
    fn same_seed_same_mutation() {
        let a = Mutation::pick(&mut StdRng::seed_from_u64(42), &base());
        let b = Mutation::pick(&mut StdRng::seed_from_u64(42), &base());
        assert_eq!(a, b);
    }

    #[test]
    fn single_step_never_reorders() {
        let single = Strategy::new("one", "One").with_steps(["build"]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert_ne!(Mutation::pick(&mut rng, &single).kind(), MutationKind::ChangeOrder);
        }
    }

    #[test]
    fn apply_shapes() {
        let mut s = base();
        Mutation::AddPreStep { step: "backup_state".into() }.apply(&mut s);
        Mutation::AddPostStep { step: "check_logs".into() }.apply(&mut s);
        assert_eq!(s.steps, ["backup_state", "clean", "build", "check_logs"]);

        Mutation::ChangeOrder { shift: 1 }.apply(&mut s);
        assert_eq!(s.steps, ["clean", "build", "check_logs", "backup_state"]);

        Mutation::AddValidation { at: 2 }.apply(&mut s);
        assert_eq!(s.steps[2], "validate_intermediate");

        Mutation::AdjustTiming { factor: 0.8 }.apply(&mut s);
        assert!((s.baseline_duration_estimate - 48.0).abs() < 1e-9);
    }

    #[test]
    fn serialized_with_type_tag() {
        let json = serde_json::to_value(Mutation::AddPreStep { step: "backup_state".into() }).unwrap();
        assert_eq!(json["type"], "add_pre_step");
        assert_eq!(json["step"], "backup_state");
    }
}
