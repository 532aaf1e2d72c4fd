//! Checkpoints taken before execution and restored on failure

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{target} does not match its checkpoint after restore")]
    Mismatch { target: String },
}

impl CheckpointError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Snapshot of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub target: String,
    /// SHA-256 of the content; `None` when the target did not exist
    pub digest: Option<String>,
    pub taken_at: DateTime<Utc>,
}

impl Checkpoint {
    #[must_use]
    pub fn existed(&self) -> bool {
        self.digest.is_some()
    }
}

/// Snapshot, restore and verify targets
pub trait CheckpointProvider: Send + Sync {
    /// # Errors
    /// Returns an error when the target cannot be captured
    fn snapshot(&self, target: &str) -> Result<Checkpoint, CheckpointError>;

    /// Put the target back; an absent checkpoint removes the target
    ///
    /// # Errors
    /// Returns an error when the target cannot be restored
    fn restore(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Whether the target currently matches the checkpoint
    ///
    /// # Errors
    /// Returns an error when the target cannot be read
    fn verify(&self, checkpoint: &Checkpoint) -> Result<bool, CheckpointError>;

    /// Drop whatever `snapshot` stored for the checkpoint
    ///
    /// The caller makes sure no other invocation still needs it.
    ///
    /// # Errors
    /// Returns an error when stored data cannot be removed
    fn discard(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

/// Content-addressed file snapshots
///
/// Blobs are stored as `<blob_dir>/<sha256>`; relative targets resolve
/// against `base`.
#[derive(Debug, Clone)]
pub struct FileCheckpoints {
    blob_dir: PathBuf,
    base: PathBuf,
}

impl FileCheckpoints {
    #[must_use]
    pub fn new(blob_dir: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self {
            blob_dir: blob_dir.into(),
            base: base.into(),
        }
    }

    #[must_use]
    pub fn resolve(&self, target: &str) -> PathBuf {
        let path = Path::new(target);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }

    fn blob(&self, digest: &str) -> PathBuf {
        self.blob_dir.join(digest)
    }

    /// Current digest; `None` when the file is absent
    fn current(&self, path: &Path) -> Result<Option<String>, CheckpointError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(digest(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::io(path, e)),
        }
    }
}

#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl CheckpointProvider for FileCheckpoints {
    fn snapshot(&self, target: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.resolve(target);
        let digest = match fs::read(&path) {
            Ok(bytes) => {
                let digest = digest(&bytes);
                let blob = self.blob(&digest);
                if !blob.exists() {
                    fs::create_dir_all(&self.blob_dir)
                        .map_err(|e| CheckpointError::io(&self.blob_dir, e))?;
                    write_atomic(&blob, &bytes)?;
                }
                Some(digest)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(CheckpointError::io(&path, e)),
        };
        debug!(target, digest = digest.as_deref().unwrap_or("absent"), "checkpoint taken");
        Ok(Checkpoint {
            target: target.to_string(),
            digest,
            taken_at: Utc::now(),
        })
    }

    fn restore(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.resolve(&checkpoint.target);
        match &checkpoint.digest {
            Some(digest) => {
                let blob = self.blob(digest);
                let bytes = fs::read(&blob).map_err(|e| CheckpointError::io(&blob, e))?;
                write_atomic(&path, &bytes)?;
            }
            None => match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CheckpointError::io(&path, e)),
            },
        }
        info!(target = %checkpoint.target, "target restored from checkpoint");
        Ok(())
    }

    fn verify(&self, checkpoint: &Checkpoint) -> Result<bool, CheckpointError> {
        Ok(self.current(&self.resolve(&checkpoint.target))? == checkpoint.digest)
    }

    fn discard(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let Some(digest) = &checkpoint.digest else {
            return Ok(());
        };
        let blob = self.blob(digest);
        match fs::remove_file(&blob) {
            Ok(()) => {
                debug!(target = %checkpoint.target, digest = %digest, "checkpoint discarded");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::io(&blob, e)),
        }
    }
}

/// Temp file in the destination directory, then rename
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CheckpointError::io(dir, e))?;
    let tmp = dir.join(format!(".arp-restore.{}.tmp", Uuid::new_v4().simple()));
    fs::write(&tmp, bytes).map_err(|e| CheckpointError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CheckpointError::io(path, e)
    })
}
