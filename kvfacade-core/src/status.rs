//! The closed status-code taxonomy every backend resolves its native errors
//! into, plus the smaller enumerations that travel alongside it.

use std::fmt;

/// Outcome of a façade call. Every public operation in this crate either
/// returns one of these directly, or returns `Result<T, StatusCode>` where
/// the `Err` variant is always a non-`OK` member of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StatusCode {
    /// The operation completed successfully.
    Ok,
    /// The requested entry does not exist.
    NotFound,
    /// The entry (or storage) already exists.
    AlreadyExists,
    /// The transaction was aborted by explicit user request.
    UserRollback,
    /// A conflicting concurrent operation was observed; the transaction is
    /// still active and the call may be retried.
    ConcurrentOperation,
    /// The transaction is not yet ready to accept requests (e.g. a long
    /// transaction still waiting on its start epoch).
    Premature,
    /// Commit is waiting on another transaction holding an overlapping write
    /// preserve.
    WaitingForOtherTransaction,
    /// Unclassified internal failure.
    ErrUnknown,
    /// I/O failure from the backing store.
    ErrIoError,
    /// The operation is recognized but not implemented by this backend.
    ErrNotImplemented,
    /// The operation is not supported by this backend at all.
    ErrUnsupported,
    /// A user-supplied callback reported failure (e.g. from `transaction_exec`).
    ErrUserError,
    /// The call is invalid given the handle's current state.
    ErrInvalidState,
    /// An argument was invalid (e.g. a strand handle passed to a write).
    ErrInvalidArgument,
    /// The key length is unsupported by the backend.
    ErrInvalidKeyLength,
    /// A resource limit (e.g. max concurrent transactions) was reached.
    ErrResourceLimitReached,
    /// The requested operation is not permitted in the current context.
    ErrIllegalOperation,
    /// The transaction has already finished (committed, aborted, or
    /// deactivated) and can no longer be used.
    ErrInactiveTransaction,
    /// The transaction was aborted by the engine; the caller should discard
    /// it and retry with a fresh one.
    ErrAbortedRetryable,
    /// A long transaction wrote to a storage outside its write preserves'
    /// conflict resolution, losing to another preserve holder.
    ErrConflictOnWritePreserve,
    /// A long transaction wrote to a storage it did not declare as a write
    /// preserve.
    ErrWriteWithoutWritePreserve,
    /// A read-only transaction's read area does not cover the storage.
    ErrReadAreaViolation,
}

impl StatusCode {
    /// Whether this code is [`StatusCode::Ok`].
    pub fn is_ok(self) -> bool {
        matches!(self, StatusCode::Ok)
    }

    /// Whether the issuing transaction is implicitly deactivated by this
    /// code and must be discarded by the caller, per the retry protocol.
    pub fn deactivates_transaction(self) -> bool {
        matches!(
            self,
            StatusCode::ErrAbortedRetryable
                | StatusCode::ErrConflictOnWritePreserve
                | StatusCode::ErrWriteWithoutWritePreserve
                | StatusCode::ErrReadAreaViolation
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Post-mortem error classification, paired with an optional [`ErrorLocator`]
/// in a [`crate::transaction::CallResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    Ok,
    Error,
    KvsKeyNotFound,
    KvsKeyAlreadyExists,
    CcLtxReadError,
    CcLtxWriteError,
    CcOccReadError,
}

/// Locates the storage/key a failed call was operating on, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLocator {
    pub storage_name: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
}

impl ErrorLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage(mut self, name: impl Into<Vec<u8>>) -> Self {
        self.storage_name = Some(name.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// How `put` should treat a pre-existing entry at the target key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PutOperation {
    /// Create the entry, or overwrite it if it already exists.
    #[default]
    CreateOrUpdate,
    /// Create the entry; fails with [`StatusCode::AlreadyExists`] if present.
    Create,
    /// Update the entry; fails with [`StatusCode::NotFound`] if absent.
    Update,
}

/// Tags a scan boundary as absent, inclusive, exclusive, or prefix-form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndPointKind {
    /// No bound on this side (−∞ as a lower bound, +∞ as an upper bound).
    #[default]
    Unbound,
    /// The boundary key itself is included in the range.
    Inclusive,
    /// The boundary key itself is excluded from the range.
    Exclusive,
    /// Treat the boundary as a prefix; includes every key with that prefix.
    PrefixedInclusive,
    /// Treat the boundary as a prefix; excludes every key with that prefix.
    PrefixedExclusive,
}

/// Transaction lifecycle states, mirroring `TransactionState::StateKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionStateKind {
    #[default]
    Unknown,
    WaitingStart,
    Started,
    WaitingCcCommit,
    Aborted,
    WaitingDurable,
    Durable,
}

impl TransactionStateKind {
    /// Whether content operations may be issued in this state.
    pub fn is_active(self) -> bool {
        matches!(self, TransactionStateKind::Started)
    }
}

/// The three transaction kinds a caller can request via [`crate::options::TransactionOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionType {
    /// A short, optimistic-concurrency-control transaction.
    #[default]
    Short,
    /// A long transaction with declared write preserves and read areas.
    Long,
    /// A read-only transaction, eligible for strand-parallel reads.
    ReadOnly,
}
