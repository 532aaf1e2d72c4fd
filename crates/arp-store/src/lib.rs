//! ARP Store - durable JSON state shared by every pipeline component
//!
//! One JSON document per [`Collection`], each independently lockable:
//! - Reads are lock-free snapshots (writers replace files by atomic rename)
//! - Read-modify-write goes through [`KnowledgeStore::update`] under a lease
//! - [`KnowledgeStore::put_if_revision`] is the compare-and-swap primitive
//! - [`LockMonitor`] reclaims leases and sessions abandoned by dead processes
//! - Async callers go through [`blocking`] so lease waits never park a runtime worker
//!
//! # Example
//!
//! ```rust,ignore
//! use arp_store::{Collection, KnowledgeStore};
//!
//! let store = KnowledgeStore::open(".arp", config.store.clone())?;
//! let count = store.update(Collection::History, |entries: &mut Vec<String>| {
//!     entries.push("rebuild ok".into());
//!     Ok::<_, StoreError>(entries.len())
//! })?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod blocking;
pub mod collection;
pub mod error;
pub mod knowledge;
pub mod lock;
pub mod prune;
pub mod session;
pub mod store;

pub use blocking::blocking;
pub use collection::Collection;
pub use error::StoreError;
pub use knowledge::{ErrorPattern, KnowledgeBase, Learning};
pub use lock::{LeaseInfo, LeaseLock};
pub use prune::{LockMonitor, PruneReport};
pub use session::{checkpoint_in_use, SessionRecord, Sessions};
pub use store::{KnowledgeStore, Versioned};
