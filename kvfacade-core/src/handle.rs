//! Opaque handle types.
//!
//! All public handles are realized as `Arc`-shared records rather than raw
//! pointers, per the design notes: this makes the strand/borrow/acquire
//! distinction enforceable at the type level and lets calls after disposal
//! return [`crate::status::StatusCode::ErrInactiveTransaction`] instead of
//! faulting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::options::StorageOptions;

/// Internal, registry-owned record for one storage.
pub(crate) struct StorageRecordInner {
    pub(crate) storage_id: u64,
    pub(crate) name: Vec<u8>,
    pub(crate) options: RwLock<StorageOptions>,
    /// Set once the storage has been deleted. The handle itself stays valid
    /// to inspect and drop; content operations against a deleted storage's id
    /// surface as backend-level lookup failures rather than through this
    /// flag.
    pub(crate) deleted: std::sync::atomic::AtomicBool,
}

/// A handle to a storage within a database. Disposal is non-transitive:
/// dropping this handle never deletes the underlying storage.
#[derive(Clone)]
pub struct StorageHandle {
    pub(crate) inner: Arc<StorageRecordInner>,
}

impl StorageHandle {
    pub fn storage_id(&self) -> u64 {
        self.inner.storage_id
    }

    pub fn name(&self) -> &[u8] {
        &self.inner.name
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle").field("storage_id", &self.storage_id()).finish()
    }
}

/// Monotonic generator for transaction ids (invariant 3: strictly increasing
/// within a database's lifetime).
#[derive(Default)]
pub(crate) struct TransactionIdGenerator(AtomicU64);

impl TransactionIdGenerator {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
