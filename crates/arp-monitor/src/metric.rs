//! Metrics, alerts and breach rules

use arp_core::{AlertId, MonitorConfig, ParseEnumError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Health signal category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MonitorType {
    Complexity,
    Coverage,
    BuildTime,
    ErrorRate,
    DependencyAge,
}

impl MonitorType {
    pub const ALL: [MonitorType; 5] = [
        Self::Complexity,
        Self::Coverage,
        Self::BuildTime,
        Self::ErrorRate,
        Self::DependencyAge,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complexity => "complexity",
            Self::Coverage => "coverage",
            Self::BuildTime => "buildTime",
            Self::ErrorRate => "errorRate",
            Self::DependencyAge => "dependencyAge",
        }
    }

    /// Configured threshold for this type
    #[must_use]
    pub fn threshold(&self, config: &MonitorConfig) -> f64 {
        match self {
            Self::Complexity => config.complexity_threshold,
            Self::Coverage => config.coverage_drop_threshold,
            Self::BuildTime => config.build_time_increase_threshold,
            Self::ErrorRate => config.error_rate_threshold,
            Self::DependencyAge => config.dependency_age_threshold,
        }
    }

    /// Quantity compared against the threshold
    ///
    /// - coverage: points lost since baseline
    /// - build time: percent increase over baseline (0 without a baseline)
    /// - everything else: the current value
    #[must_use]
    pub fn measure(&self, current: f64, baseline: f64) -> f64 {
        match self {
            Self::Coverage => baseline - current,
            Self::BuildTime => {
                if baseline > 0.0 {
                    (current - baseline) * 100.0 / baseline
                } else {
                    0.0
                }
            }
            Self::Complexity | Self::ErrorRate | Self::DependencyAge => current,
        }
    }

    #[must_use]
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Complexity => "",
            Self::Coverage => " points",
            Self::BuildTime | Self::ErrorRate => "%",
            Self::DependencyAge => " days",
        }
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "complexity" => Ok(Self::Complexity),
            "coverage" => Ok(Self::Coverage),
            "buildtime" => Ok(Self::BuildTime),
            "errorrate" => Ok(Self::ErrorRate),
            "dependencyage" => Ok(Self::DependencyAge),
            _ => Err(ParseEnumError {
                kind: "monitor type",
                value: s.to_string(),
                expected: "complexity, coverage, buildTime, errorRate, dependencyAge",
            }),
        }
    }
}

/// Latest observation for one (type, target)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorMetric {
    pub monitor_type: MonitorType,
    pub target: String,
    pub current_value: f64,
    pub baseline_value: f64,
    pub threshold: f64,
    pub updated_at: DateTime<Utc>,
}

impl MonitorMetric {
    #[must_use]
    pub fn measure(&self) -> f64 {
        self.monitor_type
            .measure(self.current_value, self.baseline_value)
    }

    #[must_use]
    pub fn is_breached(&self) -> bool {
        self.measure() > self.threshold
    }

    #[must_use]
    pub fn matches(&self, monitor_type: MonitorType, target: &str) -> bool {
        self.monitor_type == monitor_type && self.target == target
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    pub monitor_type: MonitorType,
    pub target: String,
    pub status: AlertStatus,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// Contents of the `monitors` collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorState {
    pub metrics: Vec<MonitorMetric>,
    pub alerts: Vec<Alert>,
}

impl MonitorState {
    #[must_use]
    pub fn active_alert(&self, monitor_type: MonitorType, target: &str) -> Option<&Alert> {
        self.alerts
            .iter()
            .find(|a| a.is_active() && a.monitor_type == monitor_type && a.target == target)
    }
}
