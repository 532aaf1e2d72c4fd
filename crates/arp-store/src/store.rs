//! KnowledgeStore
//!
//! Layout under the state directory:
//! - `<collection>.json`: `{"revision": n, "data": ...}`
//! - `<collection>.lock`: lease held during read-modify-write
//! - `<collection>.json.corrupt`: last unreadable document, kept for inspection

use crate::collection::Collection;
use crate::error::StoreError;
use crate::lock::LeaseLock;
use arp_core::StoreConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A collection document with its revision counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Incremented on every successful write; 0 means never written
    pub revision: u64,
    pub data: T,
}

impl<T: Default> Versioned<T> {
    fn empty() -> Self {
        Self {
            revision: 0,
            data: T::default(),
        }
    }
}

struct Loaded<T> {
    doc: Versioned<T>,
    corrupt: bool,
}

/// File-backed JSON collections shared between threads and processes
pub struct KnowledgeStore {
    root: PathBuf,
    config: StoreConfig,
    /// Serializes writers inside this process before they contend on the lease
    local: DashMap<Collection, Arc<Mutex<()>>>,
}

impl KnowledgeStore {
    /// Open (creating if needed) the state directory
    ///
    /// # Errors
    /// Returns `Io` if the directory cannot be created
    pub fn open(root: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        debug!(root = %root.display(), "knowledge store opened");
        Ok(Self {
            root,
            config,
            local: DashMap::new(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn path(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.file_name())
    }

    /// Snapshot read; a missing or corrupt document reads as the default
    ///
    /// # Errors
    /// Returns `Io` for filesystem failures other than a missing file
    pub fn get<T>(&self, collection: Collection) -> Result<Versioned<T>, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        Ok(self.load(collection)?.doc)
    }

    /// Unconditional locked write; returns the new revision
    ///
    /// # Errors
    /// Returns `LockTimeout`, `Serialize` or `Io`
    pub fn put<T>(&self, collection: Collection, data: &T) -> Result<u64, StoreError>
    where
        T: Serialize,
    {
        self.with_lock(collection, || {
            let current = self.current_revision(collection)?;
            self.write(collection, current + 1, data)
        })
    }

    /// Compare-and-swap: write only if the stored revision equals `expected`
    ///
    /// # Errors
    /// Returns `RevisionMismatch` when another writer got there first
    pub fn put_if_revision<T>(
        &self,
        collection: Collection,
        expected: u64,
        data: &T,
    ) -> Result<u64, StoreError>
    where
        T: Serialize,
    {
        self.with_lock(collection, || {
            let actual = self.current_revision(collection)?;
            if actual != expected {
                return Err(StoreError::RevisionMismatch {
                    collection,
                    expected,
                    actual,
                });
            }
            self.write(collection, actual + 1, data)
        })
    }

    /// Locked read-modify-write
    ///
    /// `f` sees the current document; if it returns `Ok` the document is
    /// written back with the next revision, on `Err` nothing is written.
    ///
    /// # Errors
    /// Propagates the closure's error or any `StoreError` converted into `E`
    pub fn update<T, R, E, F>(&self, collection: Collection, f: F) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned + Default,
        E: From<StoreError>,
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let local = self.local_lock(collection);
        let _local = local.lock();
        let _lease = LeaseLock::acquire(&self.root, collection, &self.config)?;

        let Loaded { mut doc, corrupt } = self.load::<T>(collection)?;
        if corrupt {
            self.preserve_corrupt(collection);
        }
        let out = f(&mut doc.data)?;
        self.write(collection, doc.revision + 1, &doc.data)?;
        Ok(out)
    }

    fn with_lock<R>(
        &self,
        collection: Collection,
        f: impl FnOnce() -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let local = self.local_lock(collection);
        let _local = local.lock();
        let _lease = LeaseLock::acquire(&self.root, collection, &self.config)?;
        f()
    }

    fn local_lock(&self, collection: Collection) -> Arc<Mutex<()>> {
        Arc::clone(self.local.entry(collection).or_default().value())
    }

    fn current_revision(&self, collection: Collection) -> Result<u64, StoreError> {
        #[derive(Deserialize)]
        struct Header {
            revision: u64,
        }
        let path = self.path(collection);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str::<Header>(&text).map_or(0, |h| h.revision)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(0),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn load<T>(&self, collection: Collection) -> Result<Loaded<T>, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(collection);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Ok(Loaded {
                    doc: Versioned::empty(),
                    corrupt: false,
                })
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        match serde_json::from_str::<Versioned<T>>(&text) {
            Ok(doc) => Ok(Loaded {
                doc,
                corrupt: false,
            }),
            Err(e) => {
                warn!(
                    collection = %collection,
                    path = %path.display(),
                    error = %e,
                    "collection document is corrupt; treating it as empty"
                );
                Ok(Loaded {
                    doc: Versioned::empty(),
                    corrupt: true,
                })
            }
        }
    }

    fn preserve_corrupt(&self, collection: Collection) {
        let path = self.path(collection);
        let backup = path.with_extension("json.corrupt");
        match fs::copy(&path, &backup) {
            Ok(_) => warn!(
                collection = %collection,
                backup = %backup.display(),
                "preserved corrupt document before overwrite"
            ),
            Err(e) => warn!(collection = %collection, error = %e, "could not preserve corrupt document"),
        }
    }

    /// Temp file in the same directory, then atomic rename
    fn write<T>(&self, collection: Collection, revision: u64, data: &T) -> Result<u64, StoreError>
    where
        T: Serialize,
    {
        #[derive(Serialize)]
        struct Doc<'a, T> {
            revision: u64,
            data: &'a T,
        }

        let body = serde_json::to_vec_pretty(&Doc { revision, data })
            .map_err(|source| StoreError::Serialize { collection, source })?;

        let path = self.path(collection);
        let temp = self
            .root
            .join(format!(".{}.{}.tmp", collection.file_name(), Uuid::new_v4().simple()));
        let written = fs::File::create(&temp).and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(StoreError::io(temp, e));
        }
        fs::rename(&temp, &path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            StoreError::io(&path, e)
        })?;

        debug!(collection = %collection, revision, "collection written");
        Ok(revision)
    }
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn open() -> (tempfile::TempDir, KnowledgeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path(), StoreConfig::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_collection_reads_empty() {
        let (_dir, store) = open();
        let doc: Versioned<Vec<String>> = store.get(Collection::History).unwrap();
        assert_eq!(doc.revision, 0);
        assert!(doc.data.is_empty());
    }

    #[test]
    fn put_increments_revision() {
        let (_dir, store) = open();
        assert_eq!(store.put(Collection::History, &vec!["a"]).unwrap(), 1);
        assert_eq!(store.put(Collection::History, &vec!["a", "b"]).unwrap(), 2);

        let doc: Versioned<Vec<String>> = store.get(Collection::History).unwrap();
        assert_eq!(doc.revision, 2);
        assert_eq!(doc.data, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn compare_and_swap_rejects_stale_revision() {
        let (_dir, store) = open();
        store.put(Collection::Knowledge, &BTreeMap::from([("k", 1)])).unwrap();

        let stale = 0;
        let err = store
            .put_if_revision(Collection::Knowledge, stale, &BTreeMap::from([("k", 2)]))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::RevisionMismatch { expected: 0, actual: 1, .. }
        ));

        assert_eq!(
            store
                .put_if_revision(Collection::Knowledge, 1, &BTreeMap::from([("k", 3)]))
                .unwrap(),
            2
        );
    }

    #[test]
    fn update_writes_only_on_ok() {
        let (_dir, store) = open();
        let n: usize = store
            .update(Collection::History, |v: &mut Vec<u32>| {
                v.push(7);
                Ok::<_, StoreError>(v.len())
            })
            .unwrap();
        assert_eq!(n, 1);

        let failed: Result<(), StoreError> = store.update(Collection::History, |v: &mut Vec<u32>| {
            v.push(8);
            Err(StoreError::LockTimeout {
                collection: Collection::History,
                waited: std::time::Duration::ZERO,
            })
        });
        assert!(failed.is_err());

        let doc: Versioned<Vec<u32>> = store.get(Collection::History).unwrap();
        assert_eq!(doc.data, vec![7]);
        assert_eq!(doc.revision, 1);
    }

    #[test]
    fn corrupt_document_reads_empty_and_is_preserved_on_write() {
        let (dir, store) = open();
        fs::write(store.path(Collection::Predictions), b"{not json").unwrap();

        let doc: Versioned<Vec<u32>> = store.get(Collection::Predictions).unwrap();
        assert!(doc.data.is_empty());

        store
            .update(Collection::Predictions, |v: &mut Vec<u32>| {
                v.push(1);
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert!(dir.path().join("predictions.json.corrupt").exists());
        let doc: Versioned<Vec<u32>> = store.get(Collection::Predictions).unwrap();
        assert_eq!(doc.data, vec![1]);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (dir, store) = open();
        for i in 0..5 {
            store.put(Collection::Monitors, &i).unwrap();
        }
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
