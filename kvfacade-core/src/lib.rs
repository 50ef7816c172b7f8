//! A uniform, handle-based transactional key-value façade over pluggable
//! storage backends.
//!
//! [`Database`] is the entry point: open one over a [`Backend`]
//! implementation, create storages in it, and run transactions against it
//! via [`Database::transaction_begin`] or the retrying
//! [`Database::transaction_exec`]. Every fallible call reports outcomes
//! through the single closed [`StatusCode`] taxonomy rather than a
//! per-backend error type, so callers can be written against the façade
//! without caring which engine is plugged in underneath.

mod backend;
mod database;
mod durability;
mod handle;
mod iterator;
mod options;
mod registry;
mod slice;
mod status;
mod transaction;

pub use backend::{Backend, Bound, Cursor, DurabilityCallback, ResolvedRange, Session};
pub use database::Database;
pub use durability::DurabilityDispatcher;
pub use handle::StorageHandle;
pub use iterator::{resolve_range, ScanCursor};
pub use options::{DatabaseOptions, StorageOptions, TransactionOptions};
pub use slice::{next_key_sibling, Slice};
pub use status::{
    EndPointKind, ErrorCode, ErrorLocator, PutOperation, StatusCode, TransactionStateKind, TransactionType,
};
pub use transaction::{CallResult, ControlHandle, DataHandle, StrandHandle, TransactionInfo};
