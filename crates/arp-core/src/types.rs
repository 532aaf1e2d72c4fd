//! Core types shared across the pipeline
//!
//! Defines:
//! - ULID-backed identifiers for predictions, alerts, experiments and emergencies
//! - Severity and risk level scales
//! - Change types and execution outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when a string does not name a known enum value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    /// Name of the enum being parsed
    pub kind: &'static str,
    /// Offending input
    pub value: String,
    /// Accepted spellings
    pub expected: &'static str,
}

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate a new identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s.trim()).map(Self)
            }
        }
    };
}

ulid_id!(
    /// Identifier of a prediction record
    PredictionId
);
ulid_id!(
    /// Identifier of a monitor alert
    AlertId
);
ulid_id!(
    /// Identifier of an A/B experiment
    ExperimentId
);
ulid_id!(
    /// Identifier of an emergency
    EmergencyId
);

/// Severity of an emergency or predicted issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, lowest first
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ParseEnumError {
                kind: "severity",
                value: s.to_string(),
                expected: "low, medium, high, critical",
            }),
        }
    }
}

/// Bucketed risk of a proposed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a score: [0,0.4) low, [0.4,0.6) medium, [0.6,0.8) high, [0.8,1] critical
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Outcome this level predicts: low/medium expect success, high/critical expect failure
    #[inline]
    #[must_use]
    pub fn expected_outcome(&self) -> Outcome {
        match self {
            Self::Low | Self::Medium => Outcome::Success,
            Self::High | Self::Critical => Outcome::Failure,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change an agent is about to make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Addition,
    Modification,
    Deletion,
}

impl ChangeType {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Modification => "modification",
            Self::Deletion => "deletion",
        }
    }
}

impl Default for ChangeType {
    fn default() -> Self {
        Self::Modification
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "addition" | "add" => Ok(Self::Addition),
            "modification" | "modify" => Ok(Self::Modification),
            "deletion" | "delete" => Ok(Self::Deletion),
            _ => Err(ParseEnumError {
                kind: "change type",
                value: s.to_string(),
                expected: "addition, modification, deletion",
            }),
        }
    }
}

/// Observed result of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    #[inline]
    #[must_use]
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(ParseEnumError {
                kind: "outcome",
                value: s.to_string(),
                expected: "success, failure",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn risk_level_boundaries_are_inclusive_low() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.399_999), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.599_999), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.799_999), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::Critical);
    }

    #[test]
    fn expected_outcome_rule() {
        assert_eq!(RiskLevel::Low.expected_outcome(), Outcome::Success);
        assert_eq!(RiskLevel::Medium.expected_outcome(), Outcome::Success);
        assert_eq!(RiskLevel::High.expected_outcome(), Outcome::Failure);
        assert_eq!(RiskLevel::Critical.expected_outcome(), Outcome::Failure);
    }

    #[test]
    fn severity_parse_and_order() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!(Severity::Critical > Severity::High);
        let err = "urgent".parse::<Severity>().unwrap_err();
        assert!(err.to_string().contains("urgent"));
    }

    #[test]
    fn change_type_parse() {
        assert_eq!("deletion".parse::<ChangeType>().unwrap(), ChangeType::Deletion);
        assert_eq!("modify".parse::<ChangeType>().unwrap(), ChangeType::Modification);
        assert!("rename".parse::<ChangeType>().is_err());
    }

    #[test]
    fn ids_round_trip_through_display() {
        let id = PredictionId::new();
        let parsed: PredictionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<EmergencyId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = AlertId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    proptest! {
        #[test]
        fn prop_level_is_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(RiskLevel::from_score(lo) <= RiskLevel::from_score(hi));
        }
    }
}
