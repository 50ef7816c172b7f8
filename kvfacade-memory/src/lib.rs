//! An in-process key-value backend over `BTreeMap`s guarded by `parking_lot`
//! locks, fulfilling `kvfacade_core::Backend`.
//!
//! Transactions are serialized by a single coarse mutex when
//! `DatabaseOptions::lock_enabled` is set (the default): `begin` blocks until
//! any other active transaction commits or aborts, so every transaction
//! observes a fully-serial history. With locking disabled, transactions
//! interleave freely and writes simply race last-write-wins, which is only
//! safe for read-mostly or single-writer workloads.

mod backend;
mod cursor;
mod session;

pub use backend::MemoryBackend;

#[cfg(test)]
mod tests {
    use super::*;
    use kvfacade_core::{Database, DatabaseOptions, PutOperation, StorageOptions, TransactionOptions};

    fn open() -> Database {
        Database::open(Box::new(MemoryBackend::new()), DatabaseOptions::new()).unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let db = open();
        let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();
        let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
        let data = ctrl.borrow_handle();
        assert!(data.put(storage.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate).is_ok());
        assert_eq!(data.get(storage.storage_id(), b"k").unwrap(), b"v");
        assert!(ctrl.commit(false).is_ok());
    }

    #[test]
    fn delete_then_get_reports_not_found() {
        let db = open();
        let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();
        let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
        let data = ctrl.borrow_handle();
        data.put(storage.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate);
        data.delete(storage.storage_id(), b"k");
        assert_eq!(data.get(storage.storage_id(), b"k").unwrap_err(), kvfacade_core::StatusCode::NotFound);
        ctrl.commit(false);
    }

    #[test]
    fn shared_behavior_suite() {
        kvfacade_shared_tests::run_all(&open()).unwrap();
    }

    #[test]
    fn coarse_lock_serializes_transactions() {
        let db = open();
        let ctrl1 = db.transaction_begin(TransactionOptions::short()).unwrap();
        let db2 = db.clone();
        let handle = std::thread::spawn(move || {
            // Blocks until ctrl1 commits, proving the coarse lock is held.
            db2.transaction_begin(TransactionOptions::short()).unwrap()
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!handle.is_finished());
        ctrl1.commit(false);
        let ctrl2 = handle.join().unwrap();
        ctrl2.commit(false);
    }
}
