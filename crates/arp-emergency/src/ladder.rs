//! Escalation ladder

use arp_core::EmergencyConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One rung of the ladder; entered strictly in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EscalationLevel {
    AutoFix = 1,
    AlternativeStrategy = 2,
    CrossAgentConsultation = 3,
    HumanNotification = 4,
    SafeMode = 5,
}

impl EscalationLevel {
    pub const ALL: [EscalationLevel; 5] = [
        Self::AutoFix,
        Self::AlternativeStrategy,
        Self::CrossAgentConsultation,
        Self::HumanNotification,
        Self::SafeMode,
    ];

    pub const FIRST: EscalationLevel = Self::AutoFix;

    #[inline]
    #[must_use]
    pub fn number(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AutoFix => "Agent Auto-Fix",
            Self::AlternativeStrategy => "Alternative Strategy",
            Self::CrossAgentConsultation => "Cross-Agent Consultation",
            Self::HumanNotification => "Human Notification",
            Self::SafeMode => "System Safe-Mode",
        }
    }

    #[must_use]
    pub fn actions(self) -> &'static [&'static str] {
        match self {
            Self::AutoFix => &["auto_fix", "retry", "alternative_strategy"],
            Self::AlternativeStrategy => &["try_alternative", "rollback", "clean_environment"],
            Self::CrossAgentConsultation => &["query_knowledge_base", "check_similar_issues"],
            Self::HumanNotification => &["notify_human", "create_ticket", "document_issue"],
            Self::SafeMode => &["enable_safe_mode", "halt_operations", "preserve_state"],
        }
    }

    /// Time allowed at this level; `None` for safe-mode
    #[must_use]
    pub fn timeout(self, config: &EmergencyConfig) -> Option<Duration> {
        config.level_timeout(self.number())
    }

    /// Whether a human is involved from this level on
    #[must_use]
    pub fn reaches_human(self) -> bool {
        self >= Self::HumanNotification
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {} ({})", self.number(), self.name())
    }
}

impl From<EscalationLevel> for u8 {
    fn from(level: EscalationLevel) -> Self {
        level.number()
    }
}

impl TryFrom<u8> for EscalationLevel {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::from_number(n).ok_or_else(|| format!("escalation level must be 1-5, got {n}"))
    }
}
