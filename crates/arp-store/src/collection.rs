//! Named collections

use arp_core::ParseEnumError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One independently lockable JSON document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Predictions,
    Monitors,
    Strategies,
    Evolution,
    Emergencies,
    History,
    Knowledge,
    Sessions,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Self::Predictions,
        Self::Monitors,
        Self::Strategies,
        Self::Evolution,
        Self::Emergencies,
        Self::History,
        Self::Knowledge,
        Self::Sessions,
    ];

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Predictions => "predictions",
            Self::Monitors => "monitors",
            Self::Strategies => "strategies",
            Self::Evolution => "evolution",
            Self::Emergencies => "emergencies",
            Self::History => "history",
            Self::Knowledge => "knowledge",
            Self::Sessions => "sessions",
        }
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }

    #[must_use]
    pub fn lock_name(&self) -> String {
        format!("{}.lock", self.as_str())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| ParseEnumError {
                kind: "collection",
                value: s.to_string(),
                expected: "predictions, monitors, strategies, evolution, emergencies, history, knowledge, sessions",
            })
    }
}
