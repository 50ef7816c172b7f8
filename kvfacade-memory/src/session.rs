use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;

use kvfacade_core::{
    Bound, CommitCallback, PutOperation, ResolvedRange, StatusCode, TransactionOptions, TransactionStateKind,
    TransactionType,
};

use crate::backend::Inner;
use crate::cursor::MemoryCursor;

/// `None` means "absent" (a tombstone), distinguishing "never written" from
/// "deleted within this transaction" in the overlay. The blob id list rides
/// alongside the value it was recorded for via `put_with_blobs`; a plain
/// `put` carries an empty list.
type Overlay = BTreeMap<(u64, Vec<u8>), Option<(Vec<u8>, Vec<u64>)>>;

pub(crate) struct MemorySession {
    inner: Arc<Inner>,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
    options: TransactionOptions,
    overlay: Overlay,
    /// Staged `sequence_put` writes, applied to `inner.sequences` at commit
    /// and discarded on abort, same as the key-value overlay.
    sequence_overlay: BTreeMap<u64, (u64, i64)>,
    scratch: Vec<u8>,
    state: TransactionStateKind,
    is_strand: bool,
    id: u64,
}

impl MemorySession {
    pub(crate) fn new(
        inner: Arc<Inner>,
        guard: Option<ArcMutexGuard<RawMutex, ()>>,
        options: TransactionOptions,
    ) -> Self {
        let id = inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        MemorySession {
            inner,
            guard,
            options,
            overlay: BTreeMap::new(),
            sequence_overlay: BTreeMap::new(),
            scratch: Vec::new(),
            state: TransactionStateKind::Started,
            is_strand: false,
            id,
        }
    }

    fn read_committed(&self, storage_id: u64, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.storages.read().get(&storage_id).and_then(|s| s.get(key).cloned())
    }
}

impl kvfacade_core::Session for MemorySession {
    fn check_exist(&mut self, storage_id: u64, key: &[u8]) -> StatusCode {
        match self.overlay.get(&(storage_id, key.to_vec())) {
            Some(Some(_)) => StatusCode::Ok,
            Some(None) => StatusCode::NotFound,
            None => {
                if self.read_committed(storage_id, key).is_some() {
                    StatusCode::Ok
                } else {
                    StatusCode::NotFound
                }
            }
        }
    }

    fn get(&mut self, storage_id: u64, key: &[u8]) -> Result<&[u8], StatusCode> {
        let value = match self.overlay.get(&(storage_id, key.to_vec())) {
            Some(Some((v, _))) => Some(v.clone()),
            Some(None) => None,
            None => self.read_committed(storage_id, key),
        };
        match value {
            Some(v) => {
                self.scratch = v;
                Ok(&self.scratch)
            }
            None => Err(StatusCode::NotFound),
        }
    }

    fn put(
        &mut self,
        storage_id: u64,
        key: &[u8],
        value: &[u8],
        op: PutOperation,
        blob_ids: &[u64],
    ) -> StatusCode {
        let exists = self.check_exist(storage_id, key).is_ok();
        match op {
            PutOperation::Create if exists => return StatusCode::AlreadyExists,
            PutOperation::Update if !exists => return StatusCode::NotFound,
            _ => {}
        }
        self.overlay.insert((storage_id, key.to_vec()), Some((value.to_vec(), blob_ids.to_vec())));
        StatusCode::Ok
    }

    fn delete(&mut self, storage_id: u64, key: &[u8]) -> StatusCode {
        if !self.check_exist(storage_id, key).is_ok() {
            return StatusCode::NotFound;
        }
        self.overlay.insert((storage_id, key.to_vec()), None);
        StatusCode::Ok
    }

    fn state(&self) -> TransactionStateKind {
        self.state
    }

    fn commit(&mut self, _async_commit: bool) -> StatusCode {
        if self.state != TransactionStateKind::Started {
            return StatusCode::ErrInactiveTransaction;
        }
        {
            let mut storages = self.inner.storages.write();
            let mut blob_refs = self.inner.blob_refs.write();
            for ((storage_id, key), value) in std::mem::take(&mut self.overlay) {
                let store = storages.entry(storage_id).or_default();
                match value {
                    Some((v, blob_ids)) => {
                        store.insert(key.clone(), v);
                        if blob_ids.is_empty() {
                            blob_refs.remove(&(storage_id, key));
                        } else {
                            blob_refs.insert((storage_id, key), blob_ids);
                        }
                    }
                    None => {
                        store.remove(&key);
                        blob_refs.remove(&(storage_id, key));
                    }
                }
            }
        }
        {
            let mut sequences = self.inner.sequences.write();
            for (id, entry) in std::mem::take(&mut self.sequence_overlay) {
                sequences.insert(id, entry);
            }
        }
        self.state = TransactionStateKind::Durable;
        self.guard = None;
        let marker = self.inner.durability_marker.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.durability.notify(marker);
        StatusCode::Ok
    }

    fn commit_with_callback(&mut self, cb: CommitCallback) -> bool {
        let status = self.commit(false);
        cb(status, kvfacade_core::ErrorCode::Ok, self.inner.durability_marker.load(Ordering::Acquire));
        true
    }

    fn abort(&mut self, _rollback: bool) -> StatusCode {
        self.overlay.clear();
        self.sequence_overlay.clear();
        self.state = TransactionStateKind::Aborted;
        self.guard = None;
        StatusCode::Ok
    }

    fn is_read_only(&self) -> bool {
        self.options.transaction_type == TransactionType::ReadOnly
    }

    fn is_strand(&self) -> bool {
        self.is_strand
    }

    fn engine_transaction_id(&self) -> String {
        format!("memory-{}", self.id)
    }

    fn open_cursor(
        &self,
        storage_id: u64,
        range: ResolvedRange,
        reverse: bool,
        limit: usize,
    ) -> Result<Box<dyn kvfacade_core::Cursor>, StatusCode> {
        let committed = self.inner.storages.read().get(&storage_id).cloned().unwrap_or_default();
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = committed;
        for ((sid, key), value) in self.overlay.iter() {
            if *sid != storage_id {
                continue;
            }
            match value {
                Some((v, _)) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = merged
            .into_iter()
            .filter(|(k, _)| in_range(k, &range))
            .collect();
        if reverse {
            entries.reverse();
        }
        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(Box::new(MemoryCursor::new(entries)))
    }

    fn fork_strand(&self) -> Result<Box<dyn kvfacade_core::Session>, StatusCode> {
        if self.options.transaction_type != TransactionType::ReadOnly {
            return Err(StatusCode::ErrIllegalOperation);
        }
        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemorySession {
            inner: self.inner.clone(),
            guard: None,
            options: self.options.clone(),
            overlay: BTreeMap::new(),
            sequence_overlay: BTreeMap::new(),
            scratch: Vec::new(),
            state: TransactionStateKind::Started,
            is_strand: true,
            id,
        }))
    }

    fn sequence_put(&mut self, id: u64, version: u64, value: i64) -> StatusCode {
        let existing = match self.sequence_overlay.get(&id) {
            Some(staged) => Some(*staged),
            None => self.inner.sequences.read().get(&id).copied(),
        };
        match existing {
            Some((existing_version, _)) if existing_version >= version => StatusCode::ErrInvalidArgument,
            _ => {
                self.sequence_overlay.insert(id, (version, value));
                StatusCode::Ok
            }
        }
    }
}

fn in_range(key: &[u8], range: &ResolvedRange) -> bool {
    if range.empty {
        return false;
    }
    let lower_ok = match &range.lower {
        Bound::Unbounded => true,
        Bound::Inclusive(b) => key >= b.as_slice(),
        Bound::Exclusive(b) => key > b.as_slice(),
    };
    let upper_ok = match &range.upper {
        Bound::Unbounded => true,
        Bound::Inclusive(b) => key <= b.as_slice(),
        Bound::Exclusive(b) => key < b.as_slice(),
    };
    lower_ok && upper_ok
}
