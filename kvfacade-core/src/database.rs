//! The top-level façade: a `Database` wires a [`Backend`] to the storage
//! registry, the transaction id generator, and the `transaction_exec` retry
//! shim (§4.2, §4.8).

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{Backend, CommitCallback, DurabilityCallback};
use crate::handle::{StorageHandle, TransactionIdGenerator};
use crate::options::{DatabaseOptions, StorageOptions, TransactionOptions};
use crate::registry::StorageRegistry;
use crate::status::StatusCode;
use crate::transaction::{CallResult, ControlHandle, ControlInner, DataHandle};

/// An open database: one [`Backend`] plus the façade bookkeeping layered
/// over it. Cheaply cloneable; every clone shares the same underlying
/// engine and registry.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    backend: Box<dyn Backend>,
    options: DatabaseOptions,
    registry: StorageRegistry,
    tx_ids: TransactionIdGenerator,
    active: Mutex<Vec<Weak<ControlInner>>>,
    closed: AtomicBool,
}

impl Database {
    /// Opens a database over `backend`. `options` is retained only for
    /// `print_diagnostics` and is not reinterpreted here: the backend itself
    /// consumed it during construction.
    pub fn open(backend: Box<dyn Backend>, options: DatabaseOptions) -> Result<Self, StatusCode> {
        Ok(Database {
            inner: Arc::new(DatabaseInner {
                backend,
                options,
                registry: StorageRegistry::new(),
                tx_ids: TransactionIdGenerator::default(),
                active: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Closes the database, implicitly aborting every still-active
    /// transaction. Idempotent.
    pub fn close(&self) -> Result<(), StatusCode> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let active = std::mem::take(&mut *self.inner.active.lock());
        for weak in active {
            if let Some(control) = weak.upgrade() {
                if !control.finished.swap(true, Ordering::AcqRel) {
                    control.session.lock().abort(true);
                }
            }
        }
        self.inner.backend.close()
    }

    pub fn print_diagnostics(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "backend: {}", self.inner.backend.impl_id())?;
        self.inner.backend.print_diagnostics(out)
    }

    pub fn impl_id(&self) -> &'static str {
        self.inner.backend.impl_id()
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.inner.options
    }

    // --- storage registry ---------------------------------------------

    pub fn storage_create(&self, name: &[u8], options: StorageOptions) -> Result<StorageHandle, StatusCode> {
        self.inner.registry.create(self.inner.backend.as_ref(), name, options)
    }

    pub fn storage_get(&self, name: &[u8]) -> Result<StorageHandle, StatusCode> {
        self.inner.registry.get(name)
    }

    pub fn storage_delete(&self, handle: &StorageHandle) -> Result<(), StatusCode> {
        self.inner.registry.delete(self.inner.backend.as_ref(), handle)
    }

    pub fn storage_list(&self) -> Vec<Vec<u8>> {
        self.inner.registry.list()
    }

    pub fn storage_set_options(&self, handle: &StorageHandle, options: StorageOptions) {
        self.inner.registry.set_options(handle, options)
    }

    pub fn storage_get_options(&self, handle: &StorageHandle) -> StorageOptions {
        self.inner.registry.get_options(handle)
    }

    // --- transactions ---------------------------------------------------

    /// Begins a new transaction and returns its control handle. Use
    /// [`ControlHandle::borrow_handle`] to obtain the data handle for
    /// content operations.
    pub fn transaction_begin(&self, options: TransactionOptions) -> Result<ControlHandle, StatusCode> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StatusCode::ErrInvalidState);
        }
        let session = self.inner.backend.begin(&options)?;
        let id = self.inner.tx_ids.next();
        let inner = Arc::new(ControlInner {
            id,
            options,
            session: Mutex::new(session),
            last_call: Mutex::new(CallResult::default()),
            finished: AtomicBool::new(false),
            strand_count: AtomicUsize::new(0),
        });
        let mut active = self.inner.active.lock();
        active.retain(|w| w.strong_count() > 0);
        active.push(Arc::downgrade(&inner));
        Ok(ControlHandle { inner })
    }

    /// Runs `body` to completion inside a fresh transaction, retrying on
    /// [`StatusCode::ErrAbortedRetryable`] up to `max_retries` times
    /// (`None` retries without bound). On any other non-`Ok` outcome from
    /// `body` or from commit, the transaction is aborted and that status is
    /// returned.
    pub fn transaction_exec(
        &self,
        options: TransactionOptions,
        max_retries: Option<u32>,
        mut body: impl FnMut(&DataHandle) -> StatusCode,
    ) -> StatusCode {
        let mut attempt: u32 = 0;
        loop {
            let control = match self.transaction_begin(options.clone()) {
                Ok(c) => c,
                Err(status) => return status,
            };
            let data = control.borrow_handle();
            let body_status = body(&data);
            let final_status = if body_status.is_ok() {
                control.commit(false)
            } else {
                control.abort(true);
                body_status
            };
            if final_status != StatusCode::ErrAbortedRetryable {
                return final_status;
            }
            attempt += 1;
            if let Some(max) = max_retries {
                if attempt > max {
                    return final_status;
                }
            }
        }
    }

    // --- sequences -------------------------------------------------------

    pub fn sequence_create(&self) -> u64 {
        self.inner.backend.sequence_create()
    }

    pub fn sequence_get(&self, id: u64) -> Result<(u64, i64), StatusCode> {
        self.inner.backend.sequence_get(id)
    }

    pub fn sequence_delete(&self, id: u64) -> Result<(), StatusCode> {
        self.inner.backend.sequence_delete(id)
    }

    // --- durability --------------------------------------------------------

    pub fn register_durability_callback(&self, cb: DurabilityCallback) {
        self.inner.backend.register_durability_callback(cb)
    }
}

/// Re-exported for callers that want `commit_with_callback`'s signature
/// without importing `backend` directly.
pub type Commit = CommitCallback;
