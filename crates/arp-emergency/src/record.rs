//! Emergency records and the `emergencies` collection

use crate::ladder::EscalationLevel;
use arp_core::{EmergencyId, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    /// Declared, not yet handled
    Active,
    /// On a ladder level; the last level has no deadline and waits for an operator
    Escalating,
    Resolved,
}

impl EmergencyStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Escalating => "escalating",
            Self::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for EmergencyStatus {
    type Err = arp_core::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "active" => Ok(Self::Active),
            "escalating" => Ok(Self::Escalating),
            "resolved" => Ok(Self::Resolved),
            _ => Err(arp_core::ParseEnumError {
                kind: "emergency status",
                value: s.to_string(),
                expected: "active, escalating, resolved",
            }),
        }
    }
}

/// Result of running one level's actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub performed: Vec<String>,
    pub resolved: bool,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelEntry {
    pub level: EscalationLevel,
    pub name: String,
    pub entered_at: DateTime<Utc>,
    #[serde(default)]
    pub report: Option<ActionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub text: String,
    pub resolved_at: DateTime<Utc>,
    /// Level the emergency was on when resolved; 0 if never handled
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emergency {
    pub id: EmergencyId,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub context: serde_json::Value,
    pub status: EmergencyStatus,
    /// 0 until handled, then 1..=5
    pub current_level: u8,
    #[serde(default)]
    pub escalation_history: Vec<LevelEntry>,
    /// When the current level times out
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    pub declared_at: DateTime<Utc>,
}

impl Emergency {
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == EmergencyStatus::Resolved
    }

    #[must_use]
    pub fn level(&self) -> Option<EscalationLevel> {
        EscalationLevel::from_number(self.current_level)
    }

    /// Level the ladder would enter next
    #[must_use]
    pub fn next_level(&self) -> Option<EscalationLevel> {
        match self.level() {
            None => Some(EscalationLevel::FIRST),
            Some(level) => level.next(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeModeState {
    pub enabled: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub emergency: Option<EmergencyId>,
    #[serde(default)]
    pub changed_at: Option<DateTime<Utc>>,
}

/// Contents of the `emergencies` collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmergencyState {
    pub emergencies: Vec<Emergency>,
    pub safe_mode: SafeModeState,
}

impl EmergencyState {
    #[must_use]
    pub fn find(&self, id: EmergencyId) -> Option<&Emergency> {
        self.emergencies.iter().find(|e| e.id == id)
    }

    pub fn find_mut(&mut self, id: EmergencyId) -> Option<&mut Emergency> {
        self.emergencies.iter_mut().find(|e| e.id == id)
    }
}

/// Selection for `list`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmergencyFilter {
    pub status: Option<EmergencyStatus>,
    pub severity: Option<Severity>,
}

impl EmergencyFilter {
    #[must_use]
    pub fn matches(&self, emergency: &Emergency) -> bool {
        self.status.map_or(true, |s| s == emergency.status)
            && self.severity.map_or(true, |s| s == emergency.severity)
    }
}
