//! Lock monitor
//!
//! Reclaims leases and sessions abandoned by processes that died mid-write.
//! Only entries strictly older than the lock timeout are removed; an entry
//! exactly at the threshold is kept.

use crate::collection::Collection;
use crate::error::StoreError;
use crate::lock::{reclaim, LeaseInfo};
use crate::session::Sessions;
use crate::store::KnowledgeStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What a prune pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub removed_locks: Vec<Collection>,
    pub removed_sessions: Vec<String>,
    pub threshold_secs: i64,
}

impl PruneReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed_locks.is_empty() && self.removed_sessions.is_empty()
    }
}

/// Stale lease and session reclaimer
#[derive(Debug, Clone)]
pub struct LockMonitor {
    store: Arc<KnowledgeStore>,
    threshold: chrono::Duration,
}

impl LockMonitor {
    #[must_use]
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        let threshold = chrono::Duration::from_std(store.config().lock_timeout())
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        Self { store, threshold }
    }

    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: chrono::Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Remove leases and sessions older than the threshold as of `now`
    ///
    /// # Errors
    /// Returns a `StoreError` if the sessions collection cannot be updated
    pub fn prune(&self, now: DateTime<Utc>) -> Result<PruneReport, StoreError> {
        let mut report = PruneReport {
            threshold_secs: self.threshold.num_seconds(),
            ..PruneReport::default()
        };

        for collection in Collection::ALL {
            let path = self.store.root().join(collection.lock_name());
            let seen = LeaseInfo::read(&path);
            let acquired_at = match &seen {
                Some(info) => Some(info.acquired_at),
                None => LeaseInfo::acquired_at(&path),
            };
            let Some(acquired_at) = acquired_at else {
                continue;
            };
            let age = now - acquired_at;
            if age > self.threshold && reclaim(&path, collection, age, seen.as_ref()) {
                report.removed_locks.push(collection);
            }
        }

        let threshold = self.threshold;
        let removed = self.store.update(Collection::Sessions, |sessions: &mut Sessions| {
            let stale: Vec<String> = sessions
                .values()
                .filter(|s| now - s.started_at > threshold)
                .map(|s| s.id.clone())
                .collect();
            for id in &stale {
                if let Some(session) = sessions.remove(id) {
                    warn!(
                        session = %id,
                        target = %session.target,
                        pid = session.pid,
                        "pruned abandoned workflow session"
                    );
                }
            }
            Ok::<_, StoreError>(stale)
        })?;
        report.removed_sessions = removed;

        info!(
            locks = report.removed_locks.len(),
            sessions = report.removed_sessions.len(),
            "prune complete"
        );
        Ok(report)
    }
}
