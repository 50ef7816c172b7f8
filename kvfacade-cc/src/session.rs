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
use crate::cursor::CcCursor;
use crate::store::storage_token;

pub(crate) struct CcSession {
    inner: Arc<Inner>,
    options: TransactionOptions,
    snapshot_version: u64,
    read_set: Vec<(u64, Vec<u8>, u64)>,
    write_set: BTreeMap<(u64, Vec<u8>), Option<(Vec<u8>, Vec<u64>)>>,
    /// Write-preserve tokens declared by a `Long` transaction, sorted and
    /// deduplicated once at `begin`.
    preserve_tokens: Vec<Vec<u8>>,
    /// Guards on `preserve_tokens`, held for as long as this long
    /// transaction is active. `begin` attempts to take them with a
    /// non-blocking `try_lock_arc` — never the blocking `lock_arc` — so two
    /// overlapping long transactions on the same preserve can both begin
    /// without either hanging; whichever didn't win the race carries `None`
    /// here and retries the non-blocking acquisition at `commit`, reporting
    /// [`StatusCode::WaitingForOtherTransaction`] for as long as it keeps
    /// losing.
    preserve_guards: Option<Vec<ArcMutexGuard<RawMutex, ()>>>,
    /// Staged `sequence_put` writes, applied to `inner.sequences` at commit
    /// and discarded on abort, same as the key-value write set.
    sequence_overlay: BTreeMap<u64, (u64, i64)>,
    state: TransactionStateKind,
    is_strand: bool,
    id: u64,
    scratch: Vec<u8>,
}

impl CcSession {
    pub(crate) fn begin(inner: Arc<Inner>, options: TransactionOptions) -> Result<Self, StatusCode> {
        let snapshot_version = inner.global_version.load(Ordering::Acquire);
        let mut preserve_tokens: Vec<Vec<u8>> = options.write_preserves.iter().cloned().collect();
        preserve_tokens.sort();
        preserve_tokens.dedup();
        let id = inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let preserve_guards = if options.transaction_type == TransactionType::Long {
            try_acquire_preserves(&inner, &preserve_tokens)
        } else {
            None
        };
        Ok(CcSession {
            inner,
            options,
            snapshot_version,
            read_set: Vec::new(),
            write_set: BTreeMap::new(),
            preserve_tokens,
            preserve_guards,
            sequence_overlay: BTreeMap::new(),
            state: TransactionStateKind::Started,
            is_strand: false,
            id,
            scratch: Vec::new(),
        })
    }

    fn is_preserved(&self, storage_id: u64) -> bool {
        self.options.preserves(&storage_token(storage_id))
    }

    /// Read-only transactions are subject to their declared read area;
    /// other transaction kinds are unrestricted.
    fn check_read_area(&self, storage_id: u64) -> StatusCode {
        if self.options.transaction_type == TransactionType::ReadOnly
            && !self.options.read_area_allows(&storage_token(storage_id))
        {
            return StatusCode::ErrReadAreaViolation;
        }
        StatusCode::Ok
    }
}

/// Attempts to acquire every token in `tokens` without blocking. On success,
/// all guards are returned together; on the first unavailable token, any
/// guards already taken are dropped immediately and `None` is returned.
fn try_acquire_preserves(inner: &Inner, tokens: &[Vec<u8>]) -> Option<Vec<ArcMutexGuard<RawMutex, ()>>> {
    let mut guards = Vec::with_capacity(tokens.len());
    for token in tokens {
        match ArcMutexGuard::<RawMutex, ()>::try_lock_arc(inner.preserve_lock(token)) {
            Some(guard) => guards.push(guard),
            None => return None,
        }
    }
    Some(guards)
}

impl kvfacade_core::Session for CcSession {
    fn check_exist(&mut self, storage_id: u64, key: &[u8]) -> StatusCode {
        let area = self.check_read_area(storage_id);
        if !area.is_ok() {
            return area;
        }
        if let Some(v) = self.write_set.get(&(storage_id, key.to_vec())) {
            return if v.is_some() { StatusCode::Ok } else { StatusCode::NotFound };
        }
        let (value, version) = self.inner.store.read().read_at(storage_id, key, self.snapshot_version);
        if self.options.transaction_type == TransactionType::Short {
            self.read_set.push((storage_id, key.to_vec(), version));
        }
        if value.is_some() {
            StatusCode::Ok
        } else {
            StatusCode::NotFound
        }
    }

    fn get(&mut self, storage_id: u64, key: &[u8]) -> Result<&[u8], StatusCode> {
        let area = self.check_read_area(storage_id);
        if !area.is_ok() {
            return Err(area);
        }
        if let Some(v) = self.write_set.get(&(storage_id, key.to_vec())).cloned() {
            return match v {
                Some((v, _)) => {
                    self.scratch = v;
                    Ok(&self.scratch)
                }
                None => Err(StatusCode::NotFound),
            };
        }
        let (value, version) = self.inner.store.read().read_at(storage_id, key, self.snapshot_version);
        if self.options.transaction_type == TransactionType::Short {
            self.read_set.push((storage_id, key.to_vec(), version));
        }
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
        if self.options.transaction_type == TransactionType::Long && !self.is_preserved(storage_id) {
            return StatusCode::ErrWriteWithoutWritePreserve;
        }
        let exists = self.check_exist(storage_id, key) == StatusCode::Ok;
        match op {
            PutOperation::Create if exists => return StatusCode::AlreadyExists,
            PutOperation::Update if !exists => return StatusCode::NotFound,
            _ => {}
        }
        self.write_set.insert((storage_id, key.to_vec()), Some((value.to_vec(), blob_ids.to_vec())));
        StatusCode::Ok
    }

    fn delete(&mut self, storage_id: u64, key: &[u8]) -> StatusCode {
        if self.options.transaction_type == TransactionType::Long && !self.is_preserved(storage_id) {
            return StatusCode::ErrWriteWithoutWritePreserve;
        }
        if self.check_exist(storage_id, key) != StatusCode::Ok {
            return StatusCode::NotFound;
        }
        self.write_set.insert((storage_id, key.to_vec()), None);
        StatusCode::Ok
    }

    fn state(&self) -> TransactionStateKind {
        self.state
    }

    fn commit(&mut self, _async_commit: bool) -> StatusCode {
        if self.state != TransactionStateKind::Started {
            return StatusCode::ErrInactiveTransaction;
        }
        let status = match self.options.transaction_type {
            TransactionType::ReadOnly => StatusCode::Ok,
            TransactionType::Long => {
                if self.preserve_guards.is_none() {
                    self.preserve_guards = try_acquire_preserves(&self.inner, &self.preserve_tokens);
                    if self.preserve_guards.is_none() {
                        return StatusCode::WaitingForOtherTransaction;
                    }
                }
                self.apply_write_set();
                self.apply_sequence_overlay();
                self.preserve_guards = None;
                StatusCode::Ok
            }
            TransactionType::Short => {
                let _guard = self.inner.commit_mutex.lock();
                let conflict = self
                    .read_set
                    .iter()
                    .any(|(storage_id, key, seen)| self.inner.store.read().latest_version(*storage_id, key) != *seen);
                if conflict {
                    StatusCode::ErrAbortedRetryable
                } else {
                    self.apply_write_set();
                    self.apply_sequence_overlay();
                    StatusCode::Ok
                }
            }
        };
        self.state = if status.is_ok() { TransactionStateKind::Durable } else { TransactionStateKind::Aborted };
        if status.is_ok() {
            let marker = self.inner.durability_marker.fetch_add(1, Ordering::AcqRel) + 1;
            self.inner.durability.notify(marker);
        }
        status
    }

    fn commit_with_callback(&mut self, cb: CommitCallback) -> bool {
        let status = self.commit(false);
        cb(status, kvfacade_core::ErrorCode::Ok, self.inner.durability_marker.load(Ordering::Acquire));
        true
    }

    fn abort(&mut self, _rollback: bool) -> StatusCode {
        self.write_set.clear();
        self.read_set.clear();
        self.sequence_overlay.clear();
        self.preserve_guards = None;
        self.state = TransactionStateKind::Aborted;
        StatusCode::Ok
    }

    fn is_read_only(&self) -> bool {
        self.options.transaction_type == TransactionType::ReadOnly
    }

    fn is_strand(&self) -> bool {
        self.is_strand
    }

    fn engine_transaction_id(&self) -> String {
        format!("cc-{}", self.id)
    }

    fn open_cursor(
        &self,
        storage_id: u64,
        range: ResolvedRange,
        reverse: bool,
        limit: usize,
    ) -> Result<Box<dyn kvfacade_core::Cursor>, StatusCode> {
        let area = self.check_read_area(storage_id);
        if !area.is_ok() {
            return Err(area);
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.inner.store.read().snapshot_entries(storage_id, self.snapshot_version).into_iter().collect();
        for ((sid, key), value) in self.write_set.iter() {
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
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> =
            merged.into_iter().filter(|(k, _)| in_range(k, &range)).collect();
        if reverse {
            entries.reverse();
        }
        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(Box::new(CcCursor::new(entries)))
    }

    fn fork_strand(&self) -> Result<Box<dyn kvfacade_core::Session>, StatusCode> {
        if self.options.transaction_type != TransactionType::ReadOnly {
            return Err(StatusCode::ErrIllegalOperation);
        }
        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(CcSession {
            inner: self.inner.clone(),
            options: self.options.clone(),
            snapshot_version: self.snapshot_version,
            read_set: Vec::new(),
            write_set: BTreeMap::new(),
            preserve_tokens: Vec::new(),
            preserve_guards: None,
            sequence_overlay: BTreeMap::new(),
            state: TransactionStateKind::Started,
            is_strand: true,
            id,
            scratch: Vec::new(),
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

impl CcSession {
    fn apply_write_set(&mut self) {
        let commit_version = self.inner.global_version.fetch_add(1, Ordering::AcqRel) + 1;
        let mut store = self.inner.store.write();
        for ((storage_id, key), value) in std::mem::take(&mut self.write_set) {
            match value {
                Some((v, blob_ids)) => store.write(storage_id, key, Some(v), blob_ids, commit_version),
                None => store.write(storage_id, key, None, Vec::new(), commit_version),
            }
        }
    }

    fn apply_sequence_overlay(&mut self) {
        let mut sequences = self.inner.sequences.write();
        for (id, entry) in std::mem::take(&mut self.sequence_overlay) {
            sequences.insert(id, entry);
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
