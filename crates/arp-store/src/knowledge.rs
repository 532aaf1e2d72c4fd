//! Shared knowledge base document
//!
//! The `knowledge` collection holds error patterns consulted by risk
//! prediction and the learnings the coordinator syncs after each run.

use arp_core::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contents of the `knowledge` collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBase {
    pub error_patterns: Vec<ErrorPattern>,
    pub learnings: Vec<Learning>,
}

/// A regex known to correlate with failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub pattern: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
}

fn default_severity() -> Severity {
    Severity::Medium
}

/// What one coordinator run taught us
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub context: String,
    pub operation: String,
    pub target: String,
    pub strategy: String,
    pub success: bool,
    pub elapsed_secs: f64,
    #[serde(default)]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// Learnings for `context`, most recent first
    pub fn learnings_for<'a>(&'a self, context: &'a str) -> impl Iterator<Item = &'a Learning> + 'a {
        self.learnings.iter().rev().filter(move |l| l.context == context)
    }
}
