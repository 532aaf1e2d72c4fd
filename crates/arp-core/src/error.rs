//! Error taxonomy shared by every pipeline crate
//!
//! Each crate keeps its own error enum; all of them classify into one
//! [`ErrorKind`] so callers (and the CLI) can react uniformly:
//! - `NotFound` for unknown ids
//! - `InvalidInput` for bad enum, bucket or severity values
//! - `AlreadyComplete` for mutations of finalized records
//! - `Unavailable` for an unreachable optional backend
//! - `StorageCorrupt` for unreadable state files
//! - `Conflict` for lock contention and lost compare-and-swap races
//! - `OperationFailed` for an external operation that failed and was rolled back
//! - `Fatal` for conditions that must stop the caller (failed rollback, safe-mode)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown identifier
    NotFound,
    /// Malformed argument or unsupported enum value
    InvalidInput,
    /// Attempt to mutate a finalized record
    AlreadyComplete,
    /// Optional backend unreachable
    Unavailable,
    /// State file unreadable or malformed
    StorageCorrupt,
    /// Lock contention or concurrent modification
    Conflict,
    /// External operation failed; state was restored
    OperationFailed,
    /// Unrecoverable condition surfaced to the caller
    Fatal,
}

impl ErrorKind {
    /// Stable snake_case name used in JSON error envelopes
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::AlreadyComplete => "already_complete",
            Self::Unavailable => "unavailable",
            Self::StorageCorrupt => "storage_corrupt",
            Self::Conflict => "conflict",
            Self::OperationFailed => "operation_failed",
            Self::Fatal => "fatal",
        }
    }

    /// Whether retrying the same call can succeed without operator action
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Conflict)
    }

    /// Whether a human has to look at this
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::Fatal | Self::StorageCorrupt)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
        assert_eq!(ErrorKind::AlreadyComplete.as_str(), "already_complete");
        assert_eq!(
            serde_json::to_string(&ErrorKind::StorageCorrupt).unwrap(),
            "\"storage_corrupt\""
        );
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Conflict.is_retryable());
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::Fatal.is_retryable());
    }

    #[test]
    fn human_kinds() {
        assert!(ErrorKind::Fatal.requires_human());
        assert!(!ErrorKind::InvalidInput.requires_human());
    }
}
