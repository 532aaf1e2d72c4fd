//! In-flight workflow sessions
//!
//! A coordinator invocation registers a session before it starts and removes
//! it when done. Sessions left behind by crashed processes are pruned by
//! [`crate::LockMonitor`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One running (or abandoned) coordinator invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub operation: String,
    pub target: String,
    pub context: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// Digest of the checkpoint this session may still restore from
    #[serde(default)]
    pub checkpoint: Option<String>,
}

impl SessionRecord {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        operation: impl Into<String>,
        target: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            operation: operation.into(),
            target: target.into(),
            context: context.into(),
            pid: std::process::id(),
            started_at: Utc::now(),
            checkpoint: None,
        }
    }
}

/// Contents of the `sessions` collection, keyed by session id
pub type Sessions = BTreeMap<String, SessionRecord>;

/// Whether any session other than `except` still holds a checkpoint with `digest`
#[must_use]
pub fn checkpoint_in_use(sessions: &Sessions, digest: &str, except: &str) -> bool {
    sessions
        .values()
        .any(|s| s.id != except && s.checkpoint.as_deref() == Some(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_use_ignores_the_asking_session() {
        let mut mine = SessionRecord::new("mine", "modify", "a.rs", "build_error");
        mine.checkpoint = Some("abc".into());
        let mut sessions: Sessions = BTreeMap::new();
        sessions.insert(mine.id.clone(), mine);
        assert!(!checkpoint_in_use(&sessions, "abc", "mine"));

        let mut other = SessionRecord::new("other", "modify", "b.rs", "build_error");
        other.checkpoint = Some("abc".into());
        sessions.insert(other.id.clone(), other);
        assert!(checkpoint_in_use(&sessions, "abc", "mine"));
        assert!(!checkpoint_in_use(&sessions, "def", "mine"));
    }
}
