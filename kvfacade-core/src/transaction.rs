//! The transaction state machine, control/data/strand handles, and
//! post-mortem diagnostics (§4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{CommitCallback, ResolvedRange, Session};
use crate::options::TransactionOptions;
use crate::status::{ErrorCode, ErrorLocator, PutOperation, StatusCode, TransactionStateKind};

/// Most-recent backend-native outcome for a transaction's last content call,
/// for post-mortem reporting via `recent_call_result`.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub status: StatusCode,
    pub error_code: ErrorCode,
    pub locator: Option<ErrorLocator>,
    pub description: String,
}

impl Default for CallResult {
    fn default() -> Self {
        Self { status: StatusCode::Ok, error_code: ErrorCode::Ok, locator: None, description: String::new() }
    }
}

impl CallResult {
    fn record(&mut self, status: StatusCode, locator: Option<ErrorLocator>) {
        self.status = status;
        self.error_code = if status.is_ok() { ErrorCode::Ok } else { ErrorCode::Error };
        self.locator = locator;
        self.description = format!("{status}");
    }
}

/// Backend-assigned identifier, stable for the transaction's lifetime.
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: String,
}

pub(crate) struct ControlInner {
    pub(crate) id: u64,
    pub(crate) options: TransactionOptions,
    pub(crate) session: Mutex<Box<dyn Session>>,
    pub(crate) last_call: Mutex<CallResult>,
    pub(crate) finished: AtomicBool,
    pub(crate) strand_count: std::sync::atomic::AtomicUsize,
}

impl ControlInner {
    fn note(&self, status: StatusCode, storage_name: Option<&[u8]>, key: Option<&[u8]>) -> StatusCode {
        let locator = if storage_name.is_some() || key.is_some() {
            Some(ErrorLocator {
                storage_name: storage_name.map(|s| s.to_vec()),
                key: key.map(|k| k.to_vec()),
            })
        } else {
            None
        };
        self.last_call.lock().record(status, locator);
        if status.deactivates_transaction() {
            self.finished.store(true, Ordering::Release);
        }
        status
    }
}

/// Lifecycle handle: begin a transaction with this, then call
/// `commit`/`abort`/`check_state`/`dispose` on it. Content operations go
/// through a [`DataHandle`] or [`StrandHandle`] obtained from it.
#[derive(Clone)]
pub struct ControlHandle {
    pub(crate) inner: Arc<ControlInner>,
}

impl ControlHandle {
    pub fn transaction_id(&self) -> u64 {
        self.inner.id
    }

    /// Always returns the same [`DataHandle`] for a given control handle.
    pub fn borrow_handle(&self) -> DataHandle {
        DataHandle { inner: self.inner.clone() }
    }

    /// Acquires an independent strand handle for parallel reads. Only valid
    /// on read-only transactions; other kinds report
    /// [`StatusCode::ErrIllegalOperation`].
    pub fn acquire_handle(&self) -> Result<StrandHandle, StatusCode> {
        if self.inner.options.transaction_type != crate::status::TransactionType::ReadOnly {
            return Err(StatusCode::ErrIllegalOperation);
        }
        if self.inner.finished.load(Ordering::Acquire) {
            return Err(StatusCode::ErrInactiveTransaction);
        }
        let session = self.inner.session.lock().fork_strand()?;
        self.inner.strand_count.fetch_add(1, Ordering::AcqRel);
        Ok(StrandHandle { control: Arc::downgrade(&self.inner), session: Mutex::new(session), released: AtomicBool::new(false) })
    }

    pub fn check_state(&self) -> TransactionStateKind {
        self.inner.session.lock().state()
    }

    pub fn get_info(&self) -> TransactionInfo {
        TransactionInfo { id: self.inner.session.lock().engine_transaction_id() }
    }

    pub fn recent_call_result(&self) -> CallResult {
        self.inner.last_call.lock().clone()
    }

    /// Synchronous commit shim. A [`StatusCode::WaitingForOtherTransaction`]
    /// result leaves the transaction active so the caller can poll/retry
    /// `commit` later; any other result finishes it.
    pub fn commit(&self, async_commit: bool) -> StatusCode {
        if self.inner.finished.load(Ordering::Acquire) {
            return StatusCode::ErrInactiveTransaction;
        }
        let status = self.inner.session.lock().commit(async_commit);
        if status != StatusCode::WaitingForOtherTransaction {
            self.inner.finished.store(true, Ordering::Release);
        }
        status
    }

    /// Commit with an asynchronous result callback; see
    /// [`Session::commit_with_callback`] for the single-invocation contract.
    /// As with [`Self::commit`], a `WaitingForOtherTransaction` result does
    /// not finish the transaction.
    pub fn commit_with_callback(&self, cb: CommitCallback) -> bool {
        if self.inner.finished.load(Ordering::Acquire) {
            cb(StatusCode::ErrInactiveTransaction, ErrorCode::Error, 0);
            return true;
        }
        let inner = self.inner.clone();
        let wrapped: CommitCallback = Box::new(move |status, error_code, marker| {
            if status != StatusCode::WaitingForOtherTransaction {
                inner.finished.store(true, Ordering::Release);
            }
            cb(status, error_code, marker);
        });
        self.inner.session.lock().commit_with_callback(wrapped)
    }

    /// Idempotent abort; returns `Ok` on first call and on every call after.
    pub fn abort(&self, rollback: bool) -> StatusCode {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return StatusCode::Ok;
        }
        self.inner.session.lock().abort(rollback)
    }

    /// Implicitly aborts (with rollback) if still active, then releases the
    /// control handle.
    pub fn dispose(self) {
        if !self.inner.finished.swap(true, Ordering::AcqRel) {
            self.inner.session.lock().abort(true);
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.inner.finished.load(Ordering::Acquire)
    }
}

/// The primary data handle borrowed from a [`ControlHandle`]; used for
/// content operations. Becomes invalid once its control handle commits or
/// aborts (invariant 4).
#[derive(Clone)]
pub struct DataHandle {
    pub(crate) inner: Arc<ControlInner>,
}

impl DataHandle {
    fn guard(&self) -> Result<(), StatusCode> {
        if self.inner.finished.load(Ordering::Acquire) {
            return Err(StatusCode::ErrInactiveTransaction);
        }
        Ok(())
    }

    pub fn check_exist(&self, storage_id: u64, key: &[u8]) -> StatusCode {
        if let Err(s) = self.guard() {
            return s;
        }
        let status = self.inner.session.lock().check_exist(storage_id, key);
        self.inner.note(status, None, Some(key))
    }

    /// Copies out the value; the backend's own borrowed scratch slice does
    /// not outlive the lock, so this handle returns an owned buffer.
    pub fn get(&self, storage_id: u64, key: &[u8]) -> Result<Vec<u8>, StatusCode> {
        self.guard()?;
        let mut session = self.inner.session.lock();
        match session.get(storage_id, key) {
            Ok(value) => {
                let value = value.to_vec();
                drop(session);
                self.inner.note(StatusCode::Ok, None, Some(key));
                Ok(value)
            }
            Err(status) => {
                drop(session);
                Err(self.inner.note(status, None, Some(key)))
            }
        }
    }

    pub fn put(&self, storage_id: u64, key: &[u8], value: &[u8], op: PutOperation) -> StatusCode {
        self.put_with_blobs(storage_id, key, value, op, &[])
    }

    pub fn put_with_blobs(
        &self,
        storage_id: u64,
        key: &[u8],
        value: &[u8],
        op: PutOperation,
        blob_ids: &[u64],
    ) -> StatusCode {
        if let Err(s) = self.guard() {
            return s;
        }
        if self.inner.session.lock().is_read_only() {
            return self.inner.note(StatusCode::ErrIllegalOperation, None, Some(key));
        }
        let status = self.inner.session.lock().put(storage_id, key, value, op, blob_ids);
        self.inner.note(status, None, Some(key))
    }

    pub fn delete(&self, storage_id: u64, key: &[u8]) -> StatusCode {
        if let Err(s) = self.guard() {
            return s;
        }
        if self.inner.session.lock().is_read_only() {
            return self.inner.note(StatusCode::ErrIllegalOperation, None, Some(key));
        }
        let status = self.inner.session.lock().delete(storage_id, key);
        self.inner.note(status, None, Some(key))
    }

    pub fn sequence_put(&self, id: u64, version: u64, value: i64) -> StatusCode {
        if let Err(s) = self.guard() {
            return s;
        }
        let status = self.inner.session.lock().sequence_put(id, version, value);
        self.inner.note(status, None, None)
    }

    pub fn open_cursor(
        &self,
        storage_id: u64,
        range: ResolvedRange,
        reverse: bool,
        limit: usize,
    ) -> Result<Box<dyn crate::backend::Cursor>, StatusCode> {
        self.guard()?;
        self.inner.session.lock().open_cursor(storage_id, range, reverse, limit)
    }

    pub fn is_active(&self) -> bool {
        !self.inner.finished.load(Ordering::Acquire)
    }

    /// No-op: the primary data handle's lifetime is tied to its control
    /// handle and is never independently released.
    pub fn release(self) {}
}

/// An additional data handle for parallel reads under a read-only
/// transaction, obtained via [`ControlHandle::acquire_handle`]. Must be
/// released (explicitly or by drop) before the owning control handle is
/// disposed.
pub struct StrandHandle {
    control: Weak<ControlInner>,
    session: Mutex<Box<dyn Session>>,
    released: AtomicBool,
}

impl StrandHandle {
    fn guard(&self) -> Result<(), StatusCode> {
        match self.control.upgrade() {
            Some(c) if !c.finished.load(Ordering::Acquire) => Ok(()),
            _ => Err(StatusCode::ErrInactiveTransaction),
        }
    }

    pub fn check_exist(&self, storage_id: u64, key: &[u8]) -> StatusCode {
        if let Err(s) = self.guard() {
            return s;
        }
        self.session.lock().check_exist(storage_id, key)
    }

    pub fn get(&self, storage_id: u64, key: &[u8]) -> Result<Vec<u8>, StatusCode> {
        self.guard()?;
        self.session.lock().get(storage_id, key).map(|v| v.to_vec())
    }

    /// Always [`StatusCode::ErrInvalidArgument`]: strands are read-only
    /// views (invariant 5).
    pub fn put(&self, _storage_id: u64, _key: &[u8], _value: &[u8], _op: PutOperation) -> StatusCode {
        StatusCode::ErrInvalidArgument
    }

    /// Always [`StatusCode::ErrInvalidArgument`]: strands are read-only
    /// views (invariant 5).
    pub fn delete(&self, _storage_id: u64, _key: &[u8]) -> StatusCode {
        StatusCode::ErrInvalidArgument
    }

    pub fn open_cursor(
        &self,
        storage_id: u64,
        range: ResolvedRange,
        reverse: bool,
        limit: usize,
    ) -> Result<Box<dyn crate::backend::Cursor>, StatusCode> {
        self.guard()?;
        self.session.lock().open_cursor(storage_id, range, reverse, limit)
    }

    /// Releases this strand, closing its cloned session. Explicit
    /// counterpart to the automatic release on drop.
    pub fn release(self) {
        // Drop glue performs the actual teardown.
    }
}

impl Drop for StrandHandle {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.session.lock().abort(false);
            if let Some(control) = self.control.upgrade() {
                control.strand_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}
