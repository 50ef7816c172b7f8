use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use kvfacade_core::{Database, DatabaseOptions, PutOperation, StorageOptions, TransactionOptions};
use kvfacade_lsm::{DatabaseConfig, LsmBackend};
use rand::{thread_rng, Rng};
use tempfile::TempDir;

fn randbytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0; n];
    thread_rng().fill(&mut buf[..]);
    buf
}

fn open_db(dir: &TempDir) -> Database {
    let backend = LsmBackend::open(DatabaseConfig::new(dir.path().to_str().unwrap())).unwrap();
    Database::open(Box::new(backend), DatabaseOptions::new()).unwrap()
}

fn bench_put(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let storage = db.storage_create(b"bench", StorageOptions::new()).unwrap();

    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));
    group.bench_function("single_key_transaction", |b| {
        let mut i: u64 = 0;
        b.iter(|| {
            let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
            ctrl.borrow_handle().put(storage.storage_id(), &i.to_be_bytes(), &randbytes(200), PutOperation::CreateOrUpdate);
            ctrl.commit(false);
            i += 1;
        });
    });
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let storage = db.storage_create(b"bench", StorageOptions::new()).unwrap();
    let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
    let data = ctrl.borrow_handle();
    for i in 0u64..1_000 {
        data.put(storage.storage_id(), &i.to_be_bytes(), &randbytes(200), PutOperation::CreateOrUpdate);
    }
    ctrl.commit(false);

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));
    group.bench_function("existing_key", |b| {
        let ctrl = db.transaction_begin(TransactionOptions::short()).unwrap();
        let data = ctrl.borrow_handle();
        let mut i: u64 = 0;
        b.iter(|| {
            let _ = data.get(storage.storage_id(), &(i % 1_000).to_be_bytes());
            i += 1;
        });
    });
    group.finish();
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
