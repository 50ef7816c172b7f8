//! A persistent, `sled`-backed key-value backend fulfilling
//! `kvfacade_core::Backend`.
//!
//! Storages map onto `sled` trees, and non-read-only transactions are
//! serialized through a single writer mutex: `sled` itself serializes
//! writes to a given tree internally, but the façade's write-preserve and
//! read-area invariants assume a caller-visible serial order across the
//! whole database, which a per-tree lock alone wouldn't give.

mod backend;
mod config;
mod cursor;
mod error;
mod session;

pub use backend::LsmBackend;
pub use config::DatabaseConfig;
pub use error::BackendError;

#[cfg(test)]
mod tests {
    use super::*;
    use kvfacade_core::{Database, DatabaseOptions, PutOperation, StorageOptions, TransactionOptions};
    use tempfile::TempDir;

    fn open() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new(dir.path().to_str().unwrap());
        let backend = LsmBackend::open(config).unwrap();
        (Database::open(Box::new(backend), DatabaseOptions::new()).unwrap(), dir)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (db, _dir) = open();
        let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();
        let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
        let data = ctrl.borrow_handle();
        assert!(data.put(storage.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate).is_ok());
        assert!(ctrl.commit(false).is_ok());

        let ctrl2 = db.transaction_begin(TransactionOptions::short()).unwrap();
        let data2 = ctrl2.borrow_handle();
        assert_eq!(data2.get(storage.storage_id(), b"k").unwrap(), b"v");
    }

    #[test]
    fn shared_behavior_suite() {
        let (db, _dir) = open();
        kvfacade_shared_tests::run_all(&db).unwrap();
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        {
            let backend = LsmBackend::open(DatabaseConfig::new(&path)).unwrap();
            let db = Database::open(Box::new(backend), DatabaseOptions::new()).unwrap();
            let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();
            let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
            ctrl.borrow_handle().put(storage.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate);
            ctrl.commit(false);
            db.close().unwrap();
        }
        let backend = LsmBackend::open(DatabaseConfig::new(&path)).unwrap();
        let db = Database::open(Box::new(backend), DatabaseOptions::new()).unwrap();
        let storage = db.storage_create(b"s", StorageOptions::new()).unwrap();
        let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
        assert_eq!(ctrl.borrow_handle().get(storage.storage_id(), b"k").unwrap(), b"v");
    }
}
