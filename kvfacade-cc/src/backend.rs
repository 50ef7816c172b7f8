use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use kvfacade_core::{Backend, DurabilityCallback, Session, StatusCode, TransactionOptions};

use crate::session::CcSession;
use crate::store::VersionedStore;

pub(crate) struct Inner {
    pub(crate) store: RwLock<VersionedStore>,
    pub(crate) global_version: AtomicU64,
    /// Held for the whole commit of a short (OCC) transaction: the
    /// validate-then-apply step must be atomic with respect to other short
    /// transactions' commits.
    pub(crate) commit_mutex: Mutex<()>,
    /// One lock per write-preserve token. A long transaction attempts a
    /// non-blocking acquisition of every token it declared at `begin`
    /// (never the blocking form, so two overlapping long transactions can
    /// both begin); whichever loses the race retries the same non-blocking
    /// acquisition at `commit` and reports
    /// [`StatusCode::WaitingForOtherTransaction`] instead of waiting, so the
    /// caller can poll `commit` again later.
    pub(crate) preserve_locks: Mutex<HashMap<Vec<u8>, Arc<Mutex<()>>>>,
    pub(crate) next_storage_id: AtomicU64,
    pub(crate) sequences: RwLock<HashMap<u64, (u64, i64)>>,
    pub(crate) next_sequence_id: AtomicU64,
    pub(crate) durability: kvfacade_core::DurabilityDispatcher,
    pub(crate) durability_marker: AtomicU64,
    pub(crate) next_session_id: AtomicU64,
    pub(crate) maintenance_mode: bool,
}

impl Inner {
    pub(crate) fn preserve_lock(&self, token: &[u8]) -> Arc<Mutex<()>> {
        self.preserve_locks.lock().entry(token.to_vec()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

/// A concurrency-controlled backend offering optimistic short transactions,
/// long transactions with declared write preserves, and read-only
/// transactions eligible for strand-parallel reads.
///
/// Grounded on `shirakami::Transaction`'s three transaction kinds; the MVCC
/// bookkeeping is authored directly rather than wrapping an external engine
/// (see [`crate::store`]).
pub struct CcBackend {
    pub(crate) inner: Arc<Inner>,
}

impl Default for CcBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CcBackend {
    pub fn new() -> Self {
        Self::with_options(&kvfacade_core::DatabaseOptions::new())
    }

    /// `epoch_duration`, `waiting_resolver_threads`, `recover_max_parallelism`
    /// and `index_restore_threads` are `shirakami` engine-tuning knobs kept on
    /// [`kvfacade_core::DatabaseOptions`] for interface parity with a real
    /// epoch-based engine; this backend's single-process MVCC store has no
    /// epoch GC thread or recovery phase, so they are accepted but otherwise
    /// unused. `startup_mode = "maintenance"` is honored: transactions
    /// opened while in maintenance mode are read-only regardless of the
    /// requested [`kvfacade_core::TransactionType`].
    pub fn with_options(options: &kvfacade_core::DatabaseOptions) -> Self {
        CcBackend {
            inner: Arc::new(Inner {
                store: RwLock::new(VersionedStore::default()),
                global_version: AtomicU64::new(0),
                commit_mutex: Mutex::new(()),
                preserve_locks: Mutex::new(HashMap::new()),
                next_storage_id: AtomicU64::new(1),
                sequences: RwLock::new(HashMap::new()),
                next_sequence_id: AtomicU64::new(1),
                durability: kvfacade_core::DurabilityDispatcher::new(),
                durability_marker: AtomicU64::new(0),
                next_session_id: AtomicU64::new(1),
                maintenance_mode: options.maintenance_mode(),
            }),
        }
    }
}

impl Backend for CcBackend {
    fn impl_id(&self) -> &'static str {
        "cc"
    }

    fn close(&self) -> Result<(), StatusCode> {
        Ok(())
    }

    fn print_diagnostics(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "global_version: {}", self.inner.global_version.load(Ordering::Acquire))?;
        writeln!(out, "maintenance_mode: {}", self.inner.maintenance_mode)
    }

    fn allocate_storage_id(&self) -> u64 {
        self.inner.next_storage_id.fetch_add(1, Ordering::Relaxed)
    }

    fn storage_open(&self, storage_id: u64) -> Result<(), StatusCode> {
        self.inner.store.write().open_storage(storage_id);
        Ok(())
    }

    fn storage_close(&self, storage_id: u64) -> Result<(), StatusCode> {
        self.inner.store.write().close_storage(storage_id);
        Ok(())
    }

    fn begin(&self, options: &TransactionOptions) -> Result<Box<dyn Session>, StatusCode> {
        if self.inner.maintenance_mode && options.transaction_type != kvfacade_core::TransactionType::ReadOnly {
            return Err(StatusCode::ErrIllegalOperation);
        }
        CcSession::begin(self.inner.clone(), options.clone()).map(|s| Box::new(s) as Box<dyn Session>)
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
