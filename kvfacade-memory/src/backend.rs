use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex, RwLock};

use kvfacade_core::{Backend, DurabilityCallback, Session, StatusCode, TransactionOptions};

use crate::session::MemorySession;

pub(crate) type Store = BTreeMap<Vec<u8>, Vec<u8>>;

pub(crate) struct Inner {
    pub(crate) storages: RwLock<HashMap<u64, Store>>,
    /// BLOB reference ids recorded by `put_with_blobs`, keyed the same way as
    /// `storages`; an entry here always corresponds to a live key in
    /// `storages` and is removed whenever that key is deleted or overwritten
    /// with an empty blob list.
    pub(crate) blob_refs: RwLock<HashMap<(u64, Vec<u8>), Vec<u64>>>,
    pub(crate) next_storage_id: AtomicU64,
    pub(crate) tx_lock: Arc<Mutex<()>>,
    pub(crate) lock_enabled: bool,
    pub(crate) sequences: RwLock<HashMap<u64, (u64, i64)>>,
    pub(crate) next_sequence_id: AtomicU64,
    pub(crate) durability: kvfacade_core::DurabilityDispatcher,
    pub(crate) durability_marker: AtomicU64,
    pub(crate) next_session_id: AtomicU64,
}

/// An in-process backend, grounded on `kvdb_memorydb::InMemory`'s
/// `RwLock<HashMap<_, BTreeMap<_, _>>>` shape, generalized from a single
/// flat column space to per-storage maps keyed by the façade's storage id.
pub struct MemoryBackend {
    pub(crate) inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_options(&kvfacade_core::DatabaseOptions::new())
    }

    pub fn with_options(options: &kvfacade_core::DatabaseOptions) -> Self {
        MemoryBackend {
            inner: Arc::new(Inner {
                storages: RwLock::new(HashMap::new()),
                blob_refs: RwLock::new(HashMap::new()),
                next_storage_id: AtomicU64::new(1),
                tx_lock: Arc::new(Mutex::new(())),
                lock_enabled: options.lock_enabled(),
                sequences: RwLock::new(HashMap::new()),
                next_sequence_id: AtomicU64::new(1),
                durability: kvfacade_core::DurabilityDispatcher::new(),
                durability_marker: AtomicU64::new(0),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }
}

impl Backend for MemoryBackend {
    fn impl_id(&self) -> &'static str {
        "memory"
    }

    fn close(&self) -> Result<(), StatusCode> {
        Ok(())
    }

    fn print_diagnostics(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let storages = self.inner.storages.read();
        writeln!(out, "storages: {}", storages.len())?;
        for (id, store) in storages.iter() {
            writeln!(out, "  storage {id}: {} entries", store.len())?;
        }
        Ok(())
    }

    fn allocate_storage_id(&self) -> u64 {
        self.inner.next_storage_id.fetch_add(1, Ordering::Relaxed)
    }

    fn storage_open(&self, storage_id: u64) -> Result<(), StatusCode> {
        self.inner.storages.write().entry(storage_id).or_default();
        Ok(())
    }

    fn storage_close(&self, storage_id: u64) -> Result<(), StatusCode> {
        self.inner.storages.write().remove(&storage_id);
        Ok(())
    }

    fn begin(&self, options: &TransactionOptions) -> Result<Box<dyn Session>, StatusCode> {
        // Read-only transactions never take the coarse lock, so that
        // strands can be forked and run concurrently with other readers.
        let needs_lock =
            self.inner.lock_enabled && options.transaction_type != kvfacade_core::TransactionType::ReadOnly;
        let guard = if needs_lock { Some(ArcMutexGuard::<RawMutex, ()>::lock_arc(self.inner.tx_lock.clone())) } else { None };
        Ok(Box::new(MemorySession::new(self.inner.clone(), guard, options.clone())))
    }

    fn sequence_create(&self) -> u64 {
        self.inner.next_sequence_id.fetch_add(1, Ordering::Relaxed)
    }

    fn sequence_get(&self, id: u64) -> Result<(u64, i64), StatusCode> {
        self.inner.sequences.read().get(&id).copied().ok_or(StatusCode::NotFound)
    }

    fn sequence_delete(&self, id: u64) -> Result<(), StatusCode> {
        self.inner.sequences.write().remove(&id);
        Ok(())
    }

    fn register_durability_callback(&self, cb: DurabilityCallback) {
        self.inner.durability.register(cb);
    }
}
