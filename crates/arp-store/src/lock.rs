//! Lease lock files
//!
//! A lease is `<collection>.lock`, created with create-new semantics and
//! holding the owner token, pid and acquisition time. Holders release on drop,
//! but only while the file still carries their token: a lease reclaimed by
//! another process is never deleted by its previous owner.

use crate::collection::Collection;
use crate::error::StoreError;
use arp_core::StoreConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Contents of a lease file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    pub owner: Uuid,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LeaseInfo {
    /// Read a lease file; `None` if absent or not yet fully written
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// When the lease was taken, falling back to the file mtime for
    /// half-written lease files
    #[must_use]
    pub fn acquired_at(path: &Path) -> Option<DateTime<Utc>> {
        if let Some(info) = Self::read(path) {
            return Some(info.acquired_at);
        }
        let modified = fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }
}

/// Held lease; released on drop
#[derive(Debug)]
pub struct LeaseLock {
    path: PathBuf,
    owner: Uuid,
}

impl LeaseLock {
    /// Acquire the lease for `collection` under `root`
    ///
    /// Waits up to the configured acquire timeout. A lease strictly older than
    /// the lock timeout is reclaimed with a warning.
    ///
    /// # Errors
    /// Returns `LockTimeout` when the lease stays held, `Io` on filesystem errors
    pub fn acquire(
        root: &Path,
        collection: Collection,
        config: &StoreConfig,
    ) -> Result<Self, StoreError> {
        let path = root.join(collection.lock_name());
        let started = Instant::now();
        let lock_timeout = chrono::Duration::from_std(config.lock_timeout())
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

        loop {
            let info = LeaseInfo {
                owner: Uuid::new_v4(),
                pid: std::process::id(),
                acquired_at: Utc::now(),
            };
            match try_create(&path, &info) {
                Ok(()) => {
                    debug!(collection = %collection, owner = %info.owner, "lease acquired");
                    return Ok(Self {
                        path,
                        owner: info.owner,
                    });
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }

            let seen = LeaseInfo::read(&path);
            let acquired_at = match &seen {
                Some(info) => Some(info.acquired_at),
                None => LeaseInfo::acquired_at(&path),
            };
            if let Some(acquired_at) = acquired_at {
                let age = Utc::now() - acquired_at;
                if age > lock_timeout {
                    reclaim(&path, collection, age, seen.as_ref());
                    continue;
                }
            }

            let waited = started.elapsed();
            if waited >= config.acquire_timeout() {
                return Err(StoreError::LockTimeout { collection, waited });
            }
            std::thread::sleep(config.retry_interval());
        }
    }

    #[must_use]
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the lease file still carries this holder's token
    #[must_use]
    pub fn is_held(&self) -> bool {
        LeaseInfo::read(&self.path).is_some_and(|info| info.owner == self.owner)
    }
}

impl Drop for LeaseLock {
    fn drop(&mut self) {
        if self.is_held() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to release lease");
            }
        } else {
            warn!(
                path = %self.path.display(),
                owner = %self.owner,
                "lease was reclaimed while held; not releasing"
            );
        }
    }
}

fn try_create(path: &Path, info: &LeaseInfo) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let body = serde_json::to_vec(info)?;
    file.write_all(&body)?;
    file.sync_all()
}

/// Remove a stale lease, re-checking that it is the one we judged stale
pub(crate) fn reclaim(
    path: &Path,
    collection: Collection,
    age: chrono::Duration,
    seen: Option<&LeaseInfo>,
) -> bool {
    if LeaseInfo::read(path).as_ref() != seen {
        return false;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            warn!(
                collection = %collection,
                age_secs = age.num_seconds(),
                previous_owner = ?seen.map(|i| i.owner),
                "reclaimed stale lease"
            );
            true
        }
        Err(e) if e.kind() == IoErrorKind::NotFound => false,
        Err(e) => {
            warn!(collection = %collection, error = %e, "failed to reclaim stale lease");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(lock_secs: u64, acquire_ms: u64) -> StoreConfig {
        StoreConfig {
            lock_timeout_secs: lock_secs,
            acquire_timeout_ms: acquire_ms,
            retry_interval_ms: 5,
        }
    }

    fn write_lease(path: &Path, acquired_at: DateTime<Utc>) -> Uuid {
        let info = LeaseInfo {
            owner: Uuid::new_v4(),
            pid: 1,
            acquired_at,
        };
        fs::write(path, serde_json::to_vec(&info).unwrap()).unwrap();
        info.owner
    }

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LeaseLock::acquire(dir.path(), Collection::History, &config(300, 100)).unwrap();
        assert!(lock.path().exists());
        assert!(lock.is_held());
        drop(lock);
        assert!(!dir.path().join("history.lock").exists());
    }

    #[test]
    fn held_lease_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(300, 50);
        let _held = LeaseLock::acquire(dir.path(), Collection::History, &cfg).unwrap();
        let err = LeaseLock::acquire(dir.path(), Collection::History, &cfg).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }

    #[test]
    fn stale_lease_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Collection::Strategies.lock_name());
        let stale_owner = write_lease(&path, Utc::now() - chrono::Duration::seconds(301));

        let lock = LeaseLock::acquire(dir.path(), Collection::Strategies, &config(300, 50)).unwrap();
        assert_ne!(lock.owner(), stale_owner);
    }

    #[test]
    fn reclaimed_holder_does_not_delete_new_lease() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LeaseLock::acquire(dir.path(), Collection::Monitors, &config(300, 50)).unwrap();
        let path = lock.path().to_path_buf();

        fs::remove_file(&path).unwrap();
        let thief = write_lease(&path, Utc::now());
        drop(lock);

        assert_eq!(LeaseInfo::read(&path).unwrap().owner, thief);
    }
}
