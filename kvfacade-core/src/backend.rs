//! The capability surface each concrete storage engine fulfills (§4.7).
//!
//! The façade in [`crate::database`] is a thin pass-through over these
//! traits plus argument validation; backends differ only in fidelity, never
//! in contract, per the spec's backend adapter design.

use std::io;

use crate::options::TransactionOptions;
use crate::status::{PutOperation, StatusCode, TransactionStateKind};

/// A resolved, backend-agnostic scan range, computed by
/// [`crate::iterator::resolve_range`] from the caller's [`crate::status::EndPointKind`]
/// pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub lower: Bound,
    pub upper: Bound,
    /// Set when the endpoints resolved to a range that can never contain any
    /// key (a `PREFIXED_EXCLUSIVE` lower bound whose prefix has no sibling,
    /// i.e. is all `0xFF`): backends must short-circuit to an empty cursor
    /// rather than interpreting `lower`/`upper` on their own.
    pub empty: bool,
}

/// One side of a resolved range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Unbounded,
    Inclusive(Vec<u8>),
    Exclusive(Vec<u8>),
}

/// Outcome of a commit requested with a callback: whether the callback was
/// already invoked before `commit_with_callback` returned.
pub type CommitCallback = Box<dyn FnOnce(StatusCode, crate::status::ErrorCode, u64) + Send>;

/// Callback invoked with each new durability marker as it becomes durable.
pub type DurabilityCallback = Box<dyn Fn(u64) + Send + Sync>;

/// A physical storage engine backing the façade.
///
/// Implementors must be safe for arbitrary concurrent calls from multiple
/// threads (the façade's `Database` is `Sync + Send`); a `Backend` typically
/// holds its own internal locking, mirroring `kvdb::KeyValueDB: Sync + Send`.
pub trait Backend: Send + Sync {
    /// Short backend name, e.g. `"memory"`, `"lsm"`, `"cc"`.
    fn impl_id(&self) -> &'static str;

    /// Releases engine resources; idempotent.
    fn close(&self) -> Result<(), StatusCode>;

    /// Writes human-readable diagnostics (lock state, pending transactions,
    /// I/O stats) to `out`.
    fn print_diagnostics(&self, out: &mut dyn io::Write) -> io::Result<()>;

    /// Allocates a storage id never previously used in this database's
    /// lifetime; monotonic.
    fn allocate_storage_id(&self) -> u64;

    /// Opens (creating if absent) the physical area backing `storage_id`.
    /// Idempotent: called again for a pre-existing id is a no-op.
    fn storage_open(&self, storage_id: u64) -> Result<(), StatusCode>;

    /// Physically removes the area backing `storage_id`. Idempotent.
    fn storage_close(&self, storage_id: u64) -> Result<(), StatusCode>;

    /// Begins a new transaction, returning its backend session.
    fn begin(&self, options: &TransactionOptions) -> Result<Box<dyn Session>, StatusCode>;

    /// Allocates a new, never-before-used sequence id.
    fn sequence_create(&self) -> u64;

    /// Reads the `(version, value)` pair with the largest durable version
    /// for `id`, as of the time of the call.
    fn sequence_get(&self, id: u64) -> Result<(u64, i64), StatusCode>;

    /// Removes all durable state for `id`.
    fn sequence_delete(&self, id: u64) -> Result<(), StatusCode>;

    /// Registers a durability callback; may be called multiple times to
    /// register independent callbacks. Invocation order across callbacks is
    /// unspecified.
    fn register_durability_callback(&self, cb: DurabilityCallback);

    /// Opaque handle to the backend's native datastore object, if exposing
    /// one is meaningful for this backend.
    fn native_datastore(&self) -> Option<&(dyn std::any::Any + Send + Sync)> {
        None
    }
}

/// A live transaction session: content operations, lifecycle control, and
/// cursor creation. One [`Session`] backs one façade data or strand handle.
pub trait Session: Send {
    fn check_exist(&mut self, storage_id: u64, key: &[u8]) -> StatusCode;

    /// Reads `key`'s value into the session's scratch buffer, returning a
    /// borrow of it. Valid until the next state-changing call on this
    /// session.
    fn get(&mut self, storage_id: u64, key: &[u8]) -> Result<&[u8], StatusCode>;

    fn put(
        &mut self,
        storage_id: u64,
        key: &[u8],
        value: &[u8],
        op: PutOperation,
        blob_ids: &[u64],
    ) -> StatusCode;

    fn delete(&mut self, storage_id: u64, key: &[u8]) -> StatusCode;

    fn state(&self) -> TransactionStateKind;

    /// Synchronous commit shim: blocks until durable (or pre-committed, if
    /// `async_commit` is honored by the backend).
    fn commit(&mut self, async_commit: bool) -> StatusCode;

    /// Commit with an asynchronous result callback. Returns `true` if `cb`
    /// was already invoked by the time this call returns.
    fn commit_with_callback(&mut self, cb: CommitCallback) -> bool;

    /// Aborts the transaction. Idempotent; always eventually reports `Ok`.
    fn abort(&mut self, rollback: bool) -> StatusCode;

    /// Whether this session was opened as (or forked from) a read-only
    /// transaction.
    fn is_read_only(&self) -> bool;

    /// Whether this session is a strand (parallel reader) rather than the
    /// transaction's primary session.
    fn is_strand(&self) -> bool {
        false
    }

    /// A backend-assigned id, stable for the session's lifetime, used for
    /// `TransactionInfo`.
    fn engine_transaction_id(&self) -> String;

    /// Opens a cursor over `range` within `storage_id`.
    fn open_cursor(
        &self,
        storage_id: u64,
        range: ResolvedRange,
        reverse: bool,
        limit: usize,
    ) -> Result<Box<dyn Cursor>, StatusCode>;

    /// Forks an independent strand session sharing this transaction's
    /// snapshot. Only valid for read-only transactions.
    fn fork_strand(&self) -> Result<Box<dyn Session>, StatusCode>;

    /// Writes to the sequence identified by `id`, durable together with
    /// this session's transaction.
    fn sequence_put(&mut self, id: u64, version: u64, value: i64) -> StatusCode;
}

/// An open range-scan cursor over one storage.
pub trait Cursor: Send {
    /// Advances to the next in-range entry.
    ///
    /// Returns [`StatusCode::Ok`] with the cursor now addressable via
    /// [`Cursor::key`]/[`Cursor::value`], [`StatusCode::NotFound`] once the
    /// range is exhausted, or a transient code
    /// ([`StatusCode::Premature`], [`StatusCode::ErrAbortedRetryable`],
    /// [`StatusCode::ConcurrentOperation`]) while still open.
    fn next(&mut self) -> StatusCode;

    /// The current entry's key. Valid only immediately after a `next()` that
    /// returned `Ok`.
    fn key(&self) -> &[u8];

    /// The current entry's value. Valid only immediately after a `next()`
    /// that returned `Ok`.
    fn value(&self) -> &[u8];
}
