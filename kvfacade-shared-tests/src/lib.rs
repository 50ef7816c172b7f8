//! Shared tests for `kvfacade_core::Database` functionality, to be executed
//! against each concrete backend.

use kvfacade_core::{Database, PutOperation, StatusCode, StorageOptions, TransactionOptions};

/// A test for put-then-get round-tripping.
pub fn test_put_and_get(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_put_and_get", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    assert_eq!(data.put(storage.storage_id(), b"key1", b"horse", PutOperation::CreateOrUpdate), StatusCode::Ok);
    assert_eq!(data.get(storage.storage_id(), b"key1")?, b"horse");
    assert_eq!(ctrl.commit(false), StatusCode::Ok);
    Ok(())
}

/// A test for delete-then-get reporting `NotFound`.
pub fn test_delete_and_get(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_delete_and_get", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    data.put(storage.storage_id(), b"key1", b"horse", PutOperation::CreateOrUpdate);
    assert_eq!(data.get(storage.storage_id(), b"key1")?, b"horse");
    data.delete(storage.storage_id(), b"key1");
    assert_eq!(data.get(storage.storage_id(), b"key1").unwrap_err(), StatusCode::NotFound);
    ctrl.commit(false);
    Ok(())
}

/// Reads against a storage id that was never opened report `NotFound` rather
/// than panicking.
pub fn test_get_fails_with_non_existing_storage(db: &Database) -> Result<(), StatusCode> {
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    assert_eq!(data.get(999_999, b"key").unwrap_err(), StatusCode::NotFound);
    ctrl.commit(false);
    Ok(())
}

/// A committed write is visible to transactions begun afterward, and a
/// second write to the same key against a fresh transaction overwrites it.
pub fn test_write_is_durable_across_transactions(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_write_is_durable", StorageOptions::new())?;

    let ctrl1 = db.transaction_begin(TransactionOptions::short())?;
    ctrl1.borrow_handle().put(storage.storage_id(), b"foo", b"bar", PutOperation::CreateOrUpdate);
    ctrl1.commit(false);

    let ctrl2 = db.transaction_begin(TransactionOptions::short())?;
    assert_eq!(ctrl2.borrow_handle().get(storage.storage_id(), b"foo")?, b"bar");
    ctrl2.borrow_handle().put(storage.storage_id(), b"foo", b"baz", PutOperation::CreateOrUpdate);
    ctrl2.commit(false);

    let ctrl3 = db.transaction_begin(TransactionOptions::short())?;
    assert_eq!(ctrl3.borrow_handle().get(storage.storage_id(), b"foo")?, b"baz");
    ctrl3.commit(false);
    Ok(())
}

/// A transaction that aborts leaves no trace of its writes.
pub fn test_abort_discards_writes(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_abort_discards_writes", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    ctrl.borrow_handle().put(storage.storage_id(), b"key", b"value", PutOperation::CreateOrUpdate);
    ctrl.abort(true);

    let verify = db.transaction_begin(TransactionOptions::short())?;
    assert_eq!(verify.borrow_handle().get(storage.storage_id(), b"key").unwrap_err(), StatusCode::NotFound);
    verify.commit(false);
    Ok(())
}

/// Once committed, the data handle reports `ErrInactiveTransaction` rather
/// than silently operating on a dead session.
pub fn test_data_handle_invalid_after_commit(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_handle_invalid_after_commit", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    ctrl.commit(false);
    assert_eq!(data.get(storage.storage_id(), b"key").unwrap_err(), StatusCode::ErrInactiveTransaction);
    Ok(())
}

/// A forward range scan visits entries in ascending key order.
pub fn test_scan_visits_entries_in_order(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_scan_order", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    for key in [b"b".to_vec(), b"a".to_vec(), b"c".to_vec()] {
        data.put(storage.storage_id(), &key, b"v", PutOperation::CreateOrUpdate);
    }
    let range = kvfacade_core::resolve_range(
        kvfacade_core::EndPointKind::Unbound,
        b"",
        kvfacade_core::EndPointKind::Unbound,
        b"",
    );
    let cursor = data.open_cursor(storage.storage_id(), range, false, 0)?;
    let mut scan = kvfacade_core::ScanCursor::new(cursor);
    let mut seen = Vec::new();
    while scan.next() == StatusCode::Ok {
        seen.push(scan.key()?.to_vec());
    }
    assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    ctrl.commit(false);
    Ok(())
}

/// `PutOperation::Create` refuses to overwrite, `Update` refuses to create.
pub fn test_put_operation_variants(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_put_operation_variants", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    assert_eq!(data.put(storage.storage_id(), b"k", b"v", PutOperation::Update), StatusCode::NotFound);
    assert_eq!(data.put(storage.storage_id(), b"k", b"v", PutOperation::Create), StatusCode::Ok);
    assert_eq!(data.put(storage.storage_id(), b"k", b"v2", PutOperation::Create), StatusCode::AlreadyExists);
    assert_eq!(data.put(storage.storage_id(), b"k", b"v3", PutOperation::Update), StatusCode::Ok);
    ctrl.commit(false);
    Ok(())
}

/// A prefix scan (`PREFIXED_INCLUSIVE` on both ends, same key) visits only
/// keys sharing that prefix (S3).
pub fn test_prefix_scan(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_prefix_scan", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    for key in [b"a".to_vec(), b"a1".to_vec(), b"b".to_vec(), b"c".to_vec(), b"c1".to_vec(), b"d".to_vec()] {
        data.put(storage.storage_id(), &key, b"v", PutOperation::CreateOrUpdate);
    }
    let range = kvfacade_core::resolve_range(
        kvfacade_core::EndPointKind::PrefixedInclusive,
        b"a",
        kvfacade_core::EndPointKind::PrefixedInclusive,
        b"a",
    );
    let cursor = data.open_cursor(storage.storage_id(), range, false, 0)?;
    let mut scan = kvfacade_core::ScanCursor::new(cursor);
    let mut seen = Vec::new();
    while scan.next() == StatusCode::Ok {
        seen.push(scan.key()?.to_vec());
    }
    assert_eq!(seen, vec![b"a".to_vec(), b"a1".to_vec()]);
    ctrl.commit(false);
    Ok(())
}

/// A plain inclusive/exclusive range scan visits exactly the keys between
/// its endpoints (S4).
pub fn test_range_scan(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_range_scan", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    for key in [b"a".to_vec(), b"a1".to_vec(), b"b".to_vec(), b"c".to_vec(), b"c1".to_vec(), b"d".to_vec()] {
        data.put(storage.storage_id(), &key, b"v", PutOperation::CreateOrUpdate);
    }
    let range = kvfacade_core::resolve_range(
        kvfacade_core::EndPointKind::Inclusive,
        b"b",
        kvfacade_core::EndPointKind::Exclusive,
        b"d",
    );
    let cursor = data.open_cursor(storage.storage_id(), range, false, 0)?;
    let mut scan = kvfacade_core::ScanCursor::new(cursor);
    let mut seen = Vec::new();
    while scan.next() == StatusCode::Ok {
        seen.push(scan.key()?.to_vec());
    }
    assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec(), b"c1".to_vec()]);
    ctrl.commit(false);
    Ok(())
}

/// A scan combining a `PREFIXED_EXCLUSIVE` lower bound with a
/// `PREFIXED_INCLUSIVE` upper bound excludes the lower prefix's own siblings
/// but includes the upper prefix's (S5).
pub fn test_prefixed_exclusive_combined_scan(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_prefixed_exclusive_combined_scan", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    for key in [b"a".to_vec(), b"a1".to_vec(), b"b".to_vec(), b"c".to_vec(), b"c1".to_vec(), b"d".to_vec()] {
        data.put(storage.storage_id(), &key, b"v", PutOperation::CreateOrUpdate);
    }
    let range = kvfacade_core::resolve_range(
        kvfacade_core::EndPointKind::PrefixedExclusive,
        b"a",
        kvfacade_core::EndPointKind::PrefixedInclusive,
        b"c",
    );
    let cursor = data.open_cursor(storage.storage_id(), range, false, 0)?;
    let mut scan = kvfacade_core::ScanCursor::new(cursor);
    let mut seen = Vec::new();
    while scan.next() == StatusCode::Ok {
        seen.push(scan.key()?.to_vec());
    }
    assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec(), b"c1".to_vec()]);
    ctrl.commit(false);
    Ok(())
}

/// A `sequence_put` is visible to `Database::sequence_get` only once its
/// transaction commits, and leaves no trace if the transaction aborts
/// instead (S6).
pub fn test_sequence_durability_and_abort(db: &Database) -> Result<(), StatusCode> {
    let id = db.sequence_create();

    let aborted = db.transaction_begin(TransactionOptions::short())?;
    assert_eq!(aborted.borrow_handle().sequence_put(id, 1, 100), StatusCode::Ok);
    assert_eq!(db.sequence_get(id).unwrap_err(), StatusCode::NotFound);
    aborted.abort(true);
    assert_eq!(db.sequence_get(id).unwrap_err(), StatusCode::NotFound);

    let committed = db.transaction_begin(TransactionOptions::short())?;
    assert_eq!(committed.borrow_handle().sequence_put(id, 1, 100), StatusCode::Ok);
    assert_eq!(db.sequence_get(id).unwrap_err(), StatusCode::NotFound);
    assert!(committed.commit(false).is_ok());
    assert_eq!(db.sequence_get(id).unwrap(), (1, 100));
    Ok(())
}

/// `put_with_blobs` succeeds and the value it wrote round-trips through
/// `get` like an ordinary `put`; there is no dedicated BLOB-reference getter
/// to assert against, mirroring the original engines' own light coverage of
/// this call.
pub fn test_put_with_blobs_records_reference_ids(db: &Database) -> Result<(), StatusCode> {
    let storage = db.storage_create(b"test_put_with_blobs", StorageOptions::new())?;
    let ctrl = db.transaction_begin(TransactionOptions::short())?;
    let data = ctrl.borrow_handle();
    assert_eq!(
        data.put_with_blobs(storage.storage_id(), b"k", b"v", PutOperation::CreateOrUpdate, &[7, 8]),
        StatusCode::Ok
    );
    assert_eq!(data.get(storage.storage_id(), b"k")?, b"v");
    ctrl.commit(false);
    Ok(())
}

/// Runs every test in this crate against `db`, returning on the first
/// failure. Callers typically build a fresh `Database` per backend and call
/// this from their own `#[test]` function.
pub fn run_all(db: &Database) -> Result<(), StatusCode> {
    test_put_and_get(db)?;
    test_delete_and_get(db)?;
    test_get_fails_with_non_existing_storage(db)?;
    test_write_is_durable_across_transactions(db)?;
    test_abort_discards_writes(db)?;
    test_data_handle_invalid_after_commit(db)?;
    test_scan_visits_entries_in_order(db)?;
    test_put_operation_variants(db)?;
    test_prefix_scan(db)?;
    test_range_scan(db)?;
    test_prefixed_exclusive_combined_scan(db)?;
    test_sequence_durability_and_abort(db)?;
    test_put_with_blobs_records_reference_ids(db)?;
    Ok(())
}
