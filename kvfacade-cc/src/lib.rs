//! A concurrency-controlled key-value backend: optimistic short
//! transactions validated at commit, long transactions serialized on
//! declared write preserves, and read-only transactions eligible for
//! strand-parallel reads.
//!
//! Grounded on `examples/original_source/shirakami/src/Transaction.cpp`'s
//! three transaction kinds, reauthored as a direct MVCC store (see
//! [`store`]) rather than wrapping an external engine — no crates.io crate
//! offers this exact embeddable surface.

mod backend;
mod cursor;
mod session;
mod store;

pub use backend::CcBackend;
pub use store::storage_token;

#[cfg(test)]
mod tests {
    use super::*;
    use kvfacade_core::{Database, DatabaseOptions, PutOperation, StatusCode, StorageOptions, TransactionOptions};

    fn open() -> Database {
        Database::open(Box::new(CcBackend::new()), DatabaseOptions::new()).unwrap()
    }

    #[test]
    fn shared_behavior_suite() {
        kvfacade_shared_tests::run_all(&open()).unwrap();
    }

    #[test]
    fn short_transactions_read_own_writes() {
        let db = open();
        let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();
        let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
        let data = ctrl.borrow_handle();
        data.put(storage.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate);
        assert_eq!(data.get(storage.storage_id(), b"k").unwrap(), b"v");
        assert!(ctrl.commit(false).is_ok());
    }

    #[test]
    fn concurrent_short_transaction_write_conflict_aborts_retryable() {
        let db = open();
        let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();

        let seed = db.transaction_begin(TransactionOptions::short()).unwrap();
        seed.borrow_handle().put(storage.storage_id(), b"k", b"v0", PutOperation::CreateOrUpdate);
        seed.commit(false);

        let t1 = db.transaction_begin(TransactionOptions::short()).unwrap();
        let t2 = db.transaction_begin(TransactionOptions::short()).unwrap();
        // Both read the same version before either writes.
        assert_eq!(t1.borrow_handle().get(storage.storage_id(), b"k").unwrap(), b"v0");
        assert_eq!(t2.borrow_handle().get(storage.storage_id(), b"k").unwrap(), b"v0");

        t1.borrow_handle().put(storage.storage_id(), b"k", b"v1", PutOperation::CreateOrUpdate);
        assert!(t1.commit(false).is_ok());

        t2.borrow_handle().put(storage.storage_id(), b"k", b"v2", PutOperation::CreateOrUpdate);
        assert_eq!(t2.commit(false), StatusCode::ErrAbortedRetryable);
    }

    #[test]
    fn long_transaction_rejects_writes_outside_write_preserves() {
        let db = open();
        let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();
        let preserved = db.storage_create(b"p", StorageOptions::new()).unwrap();
        let ctrl = db
            .transaction_begin(TransactionOptions::long([storage_token(preserved.storage_id())]))
            .unwrap();
        let data = ctrl.borrow_handle();
        assert_eq!(
            data.put(storage.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate),
            StatusCode::ErrWriteWithoutWritePreserve
        );
        assert!(data.put(preserved.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate).is_ok());
        assert!(ctrl.commit(false).is_ok());
    }

    #[test]
    fn long_transaction_preserve_contention_waits_then_resolves() {
        let db = open();
        let preserved = db.storage_create(b"p", StorageOptions::new()).unwrap();
        let token = storage_token(preserved.storage_id());

        // Both begin successfully — the old blocking-lock bug would hang the
        // second `transaction_begin` here.
        let t1 = db.transaction_begin(TransactionOptions::long([token.clone()])).unwrap();
        let t2 = db.transaction_begin(TransactionOptions::long([token])).unwrap();
        assert!(t1.borrow_handle().put(preserved.storage_id(), b"k", b"v1", PutOperation::CreateOrUpdate).is_ok());
        assert!(t2.borrow_handle().put(preserved.storage_id(), b"k", b"v2", PutOperation::CreateOrUpdate).is_ok());

        // t1 won the preserve lock at begin; t2's commit cannot take it yet.
        assert_eq!(t2.commit(false), StatusCode::WaitingForOtherTransaction);
        assert_eq!(t2.check_state(), kvfacade_core::TransactionStateKind::Started);

        // t1 releases the lock on commit; t2 can now retry successfully.
        assert!(t1.commit(false).is_ok());
        assert!(t2.commit(false).is_ok());
    }

    #[test]
    fn read_only_transaction_rejects_reads_outside_read_area() {
        let db = open();
        let allowed = db.storage_create(b"allowed", StorageOptions::new()).unwrap();
        let other = db.storage_create(b"other", StorageOptions::new()).unwrap();
        let writer = db.transaction_begin(TransactionOptions::short()).unwrap();
        writer.borrow_handle().put(allowed.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate);
        writer.borrow_handle().put(other.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate);
        writer.commit(false);

        let ctrl = db
            .transaction_begin(
                TransactionOptions::read_only().with_read_area_inclusive([storage_token(allowed.storage_id())]),
            )
            .unwrap();
        let data = ctrl.borrow_handle();
        assert_eq!(data.get(allowed.storage_id(), b"k").unwrap(), b"v");
        assert_eq!(data.get(other.storage_id(), b"k").unwrap_err(), StatusCode::ErrReadAreaViolation);
        ctrl.commit(false);
    }

    #[test]
    fn read_only_strand_sees_snapshot_and_rejects_writes() {
        let db = open();
        let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();
        let writer = db.transaction_begin(TransactionOptions::short()).unwrap();
        writer.borrow_handle().put(storage.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate);
        writer.commit(false);

        let ctrl = db.transaction_begin(TransactionOptions::read_only()).unwrap();
        let strand = ctrl.acquire_handle().unwrap();
        assert_eq!(strand.get(storage.storage_id(), b"k").unwrap(), b"v");
        assert_eq!(strand.put(storage.storage_id(), b"k", b"v2", PutOperation::CreateOrUpdate), StatusCode::ErrInvalidArgument);
        strand.release();
        assert!(ctrl.commit(false).is_ok());
    }
}
