use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex, RwLock};

use kvfacade_core::{Backend, DurabilityCallback, Session, StatusCode, TransactionOptions, TransactionType};

use crate::config::DatabaseConfig;
use crate::error::BackendError;
use crate::session::LsmSession;

const SEQUENCES_TREE: &str = "__kvfacade_sequences__";
const BLOB_REFS_TREE: &str = "__kvfacade_blob_refs__";

pub(crate) struct Inner {
    pub(crate) db: sled::Db,
    pub(crate) trees: RwLock<HashMap<u64, sled::Tree>>,
    pub(crate) sequences: sled::Tree,
    /// BLOB reference ids recorded by `put_with_blobs`, keyed by the
    /// storage id (big-endian) followed by the value's key; packed as
    /// consecutive big-endian `u64`s. Cleared whenever the key is deleted
    /// or overwritten with an empty blob list.
    pub(crate) blob_refs: sled::Tree,
    pub(crate) next_storage_id: AtomicU64,
    pub(crate) writer_lock: Arc<Mutex<()>>,
    pub(crate) durability: kvfacade_core::DurabilityDispatcher,
    pub(crate) durability_marker: AtomicU64,
    pub(crate) next_session_id: AtomicU64,
}

pub(crate) fn blob_refs_key(storage_id: u64, key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + key.len());
    buf.extend_from_slice(&storage_id.to_be_bytes());
    buf.extend_from_slice(key);
    buf
}

pub(crate) fn encode_blob_ids(blob_ids: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(blob_ids.len() * 8);
    for id in blob_ids {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    buf
}

/// A persistent backend over `sled`, one `Tree` per storage, serializing
/// all non-read-only transactions through a single writer mutex.
///
/// Grounded on `kvdb_sled::Database`'s tree-per-column layout; unlike that
/// implementation (which opens a fixed tuple of trees for `sled`'s limited
/// cross-tree transaction support), storages are applied as independent
/// per-tree batches at commit, so commit is atomic within one storage but
/// not across several touched by the same transaction.
pub struct LsmBackend {
    pub(crate) inner: Arc<Inner>,
}

impl LsmBackend {
    pub fn open(config: DatabaseConfig) -> Result<Self, StatusCode> {
        let sled_config = sled::Config::default()
            .path(&config.path)
            .cache_capacity(config.cache_capacity())
            .flush_every_ms(config.flush_every_ms);
        let db = sled_config.open().map_err(BackendError::from)?;
        let sequences = db.open_tree(SEQUENCES_TREE).map_err(BackendError::from)?;
        let blob_refs = db.open_tree(BLOB_REFS_TREE).map_err(BackendError::from)?;
        Ok(LsmBackend {
            inner: Arc::new(Inner {
                db,
                trees: RwLock::new(HashMap::new()),
                sequences,
                blob_refs,
                next_storage_id: AtomicU64::new(1),
                writer_lock: Arc::new(Mutex::new(())),
                durability: kvfacade_core::DurabilityDispatcher::new(),
                durability_marker: AtomicU64::new(0),
                next_session_id: AtomicU64::new(1),
            }),
        })
    }

    fn tree_name(storage_id: u64) -> String {
        format!("storage-{storage_id}")
    }
}

impl Backend for LsmBackend {
    fn impl_id(&self) -> &'static str {
        "lsm"
    }

    fn close(&self) -> Result<(), StatusCode> {
        self.inner.db.flush().map_err(BackendError::from)?;
        Ok(())
    }

    fn print_diagnostics(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let trees = self.inner.trees.read();
        writeln!(out, "storages: {}", trees.len())?;
        for (id, tree) in trees.iter() {
            writeln!(out, "  storage {id}: {} entries", tree.len())?;
        }
        Ok(())
    }

    fn allocate_storage_id(&self) -> u64 {
        self.inner.next_storage_id.fetch_add(1, Ordering::Relaxed)
    }

    fn storage_open(&self, storage_id: u64) -> Result<(), StatusCode> {
        let tree = self.inner.db.open_tree(Self::tree_name(storage_id)).map_err(BackendError::from)?;
        self.inner.trees.write().insert(storage_id, tree);
        Ok(())
    }

    fn storage_close(&self, storage_id: u64) -> Result<(), StatusCode> {
        self.inner.trees.write().remove(&storage_id);
        self.inner.db.drop_tree(Self::tree_name(storage_id)).map_err(BackendError::from)?;
        Ok(())
    }

    fn begin(&self, options: &TransactionOptions) -> Result<Box<dyn Session>, StatusCode> {
        let guard = if options.transaction_type != TransactionType::ReadOnly {
            Some(ArcMutexGuard::<RawMutex, ()>::lock_arc(self.inner.writer_lock.clone()))
        } else {
            None
        };
        Ok(Box::new(LsmSession::new(self.inner.clone(), guard, options.clone())))
    }

    fn sequence_create(&self) -> u64 {
        self.inner.next_storage_id.fetch_add(1, Ordering::Relaxed)
    }

    fn sequence_get(&self, id: u64) -> Result<(u64, i64), StatusCode> {
        let raw = self.inner.sequences.get(id.to_be_bytes()).map_err(BackendError::from)?;
        match raw {
            Some(ivec) if ivec.len() == 16 => {
                let version = u64::from_be_bytes(ivec[0..8].try_into().unwrap());
                let value = i64::from_be_bytes(ivec[8..16].try_into().unwrap());
                Ok((version, value))
            }
            _ => Err(StatusCode::NotFound),
        }
    }

    fn sequence_delete(&self, id: u64) -> Result<(), StatusCode> {
        self.inner.sequences.remove(id.to_be_bytes()).map_err(BackendError::from)?;
        Ok(())
    }

    fn register_durability_callback(&self, cb: DurabilityCallback) {
        self.inner.durability.register(cb);
    }

    fn native_datastore(&self) -> Option<&(dyn std::any::Any + Send + Sync)> {
        Some(&self.inner.db)
    }
}
