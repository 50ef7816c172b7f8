use std::collections::BTreeMap;
use std::ops::Bound as StdBound;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;

use kvfacade_core::{
    Bound, CommitCallback, PutOperation, ResolvedRange, StatusCode, TransactionOptions, TransactionStateKind,
    TransactionType,
};

use crate::backend::{blob_refs_key, encode_blob_ids, Inner};
use crate::cursor::LsmCursor;
use crate::error::BackendError;

type Overlay = BTreeMap<(u64, Vec<u8>), Option<(Vec<u8>, Vec<u64>)>>;

pub(crate) struct LsmSession {
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

impl LsmSession {
    pub(crate) fn new(
        inner: Arc<Inner>,
        guard: Option<ArcMutexGuard<RawMutex, ()>>,
        options: TransactionOptions,
    ) -> Self {
        let id = inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        LsmSession {
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

    fn read_committed(&self, storage_id: u64, key: &[u8]) -> Result<Option<Vec<u8>>, StatusCode> {
        let trees = self.inner.trees.read();
        let Some(tree) = trees.get(&storage_id) else {
            return Ok(None);
        };
        tree.get(key).map(|opt| opt.map(|ivec| ivec.to_vec())).map_err(|e| BackendError::from(e).into())
    }
}

impl kvfacade_core::Session for LsmSession {
    fn check_exist(&mut self, storage_id: u64, key: &[u8]) -> StatusCode {
        match self.overlay.get(&(storage_id, key.to_vec())) {
            Some(Some(_)) => StatusCode::Ok,
            Some(None) => StatusCode::NotFound,
            None => match self.read_committed(storage_id, key) {
                Ok(Some(_)) => StatusCode::Ok,
                Ok(None) => StatusCode::NotFound,
                Err(status) => status,
            },
        }
    }

    fn get(&mut self, storage_id: u64, key: &[u8]) -> Result<&[u8], StatusCode> {
        let value = match self.overlay.get(&(storage_id, key.to_vec())) {
            Some(Some((v, _))) => Some(v.clone()),
            Some(None) => None,
            None => self.read_committed(storage_id, key)?,
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
        let exists = self.check_exist(storage_id, key) == StatusCode::Ok;
        match op {
            PutOperation::Create if exists => return StatusCode::AlreadyExists,
            PutOperation::Update if !exists => return StatusCode::NotFound,
            _ => {}
        }
        self.overlay.insert((storage_id, key.to_vec()), Some((value.to_vec(), blob_ids.to_vec())));
        StatusCode::Ok
    }

    fn delete(&mut self, storage_id: u64, key: &[u8]) -> StatusCode {
        if self.check_exist(storage_id, key) != StatusCode::Ok {
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
        let by_storage = std::mem::take(&mut self.overlay);
        let trees = self.inner.trees.read();
        let mut batches: std::collections::HashMap<u64, sled::Batch> = std::collections::HashMap::new();
        let mut blob_refs_batch = sled::Batch::default();
        for ((storage_id, key), value) in by_storage {
            let batch = batches.entry(storage_id).or_default();
            match value {
                Some((v, blob_ids)) => {
                    batch.insert(key.clone(), v);
                    let refs_key = blob_refs_key(storage_id, &key);
                    if blob_ids.is_empty() {
                        blob_refs_batch.remove(refs_key);
                    } else {
                        blob_refs_batch.insert(refs_key, encode_blob_ids(&blob_ids));
                    }
                }
                None => {
                    batch.remove(key.clone());
                    blob_refs_batch.remove(blob_refs_key(storage_id, &key));
                }
            }
        }
        for (storage_id, batch) in batches {
            let Some(tree) = trees.get(&storage_id) else { continue };
            if let Err(e) = tree.apply_batch(batch) {
                return BackendError::from(e).into();
            }
        }
        if let Err(e) = self.inner.blob_refs.apply_batch(blob_refs_batch) {
            return BackendError::from(e).into();
        }
        drop(trees);
        for (id, (version, value)) in std::mem::take(&mut self.sequence_overlay) {
            let mut buf = [0u8; 16];
            buf[0..8].copy_from_slice(&version.to_be_bytes());
            buf[8..16].copy_from_slice(&value.to_be_bytes());
            if let Err(e) = self.inner.sequences.insert(id.to_be_bytes(), buf.to_vec()) {
                return BackendError::from(e).into();
            }
        }
        if let Err(e) = self.inner.db.flush() {
            return BackendError::from(e).into();
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
        format!("lsm-{}", self.id)
    }

    fn open_cursor(
        &self,
        storage_id: u64,
        range: ResolvedRange,
        reverse: bool,
        limit: usize,
    ) -> Result<Box<dyn kvfacade_core::Cursor>, StatusCode> {
        if range.empty {
            return Ok(Box::new(LsmCursor::new(Vec::new())));
        }
        let trees = self.inner.trees.read();
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        if let Some(tree) = trees.get(&storage_id) {
            let std_range = (to_std_bound(&range.lower), to_std_bound(&range.upper));
            for item in tree.range::<Vec<u8>, _>(std_range) {
                let (k, v) = item.map_err(|e| -> StatusCode { BackendError::from(e).into() })?;
                merged.insert(k.to_vec(), v.to_vec());
            }
        }
        drop(trees);
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
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = merged.into_iter().collect();
        if reverse {
            entries.reverse();
        }
        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(Box::new(LsmCursor::new(entries)))
    }

    fn fork_strand(&self) -> Result<Box<dyn kvfacade_core::Session>, StatusCode> {
        if self.options.transaction_type != TransactionType::ReadOnly {
            return Err(StatusCode::ErrIllegalOperation);
        }
        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(LsmSession {
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
            None => match self.inner.sequences.get(id.to_be_bytes()) {
                Ok(Some(raw)) if raw.len() == 16 => {
                    let existing_version = u64::from_be_bytes(raw[0..8].try_into().unwrap());
                    let existing_value = i64::from_be_bytes(raw[8..16].try_into().unwrap());
                    Some((existing_version, existing_value))
                }
                Ok(_) => None,
                Err(e) => return BackendError::from(e).into(),
            },
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

fn to_std_bound(bound: &Bound) -> StdBound<Vec<u8>> {
    match bound {
        Bound::Unbounded => StdBound::Unbounded,
        Bound::Inclusive(b) => StdBound::Included(b.clone()),
        Bound::Exclusive(b) => StdBound::Excluded(b.clone()),
    }
}
