//! The versioned, in-memory store shared by every session: a
//! monotonically-versioned `BTreeMap` per storage, read under a snapshot
//! version and written behind the global commit mutex.
//!
//! No external crate on crates.io offers an embeddable OCC/MVCC engine at
//! this grain, so this is authored directly, the way `kvdb_memorydb` authors
//! its own map rather than reaching for a dependency.

use std::collections::{BTreeMap, HashMap};

/// One historical value of a key: `value == None` marks a tombstone.
/// `blob_ids` is the set of BLOB reference identifiers recorded against this
/// version by `put_with_blobs`, empty for a plain `put` or a tombstone.
#[derive(Clone)]
pub(crate) struct VersionedValue {
    pub(crate) version: u64,
    pub(crate) value: Option<Vec<u8>>,
    pub(crate) blob_ids: Vec<u64>,
}

#[derive(Default)]
pub(crate) struct VersionedStore {
    storages: HashMap<u64, BTreeMap<Vec<u8>, Vec<VersionedValue>>>,
}

impl VersionedStore {
    pub(crate) fn open_storage(&mut self, storage_id: u64) {
        self.storages.entry(storage_id).or_default();
    }

    pub(crate) fn close_storage(&mut self, storage_id: u64) {
        self.storages.remove(&storage_id);
    }

    /// The latest version of `key` visible at or before `snapshot`, and that
    /// version number (0 if no version existed yet at that snapshot).
    pub(crate) fn read_at(&self, storage_id: u64, key: &[u8], snapshot: u64) -> (Option<Vec<u8>>, u64) {
        let Some(versions) = self.storages.get(&storage_id).and_then(|s| s.get(key)) else {
            return (None, 0);
        };
        match versions.iter().rev().find(|v| v.version <= snapshot) {
            Some(v) => (v.value.clone(), v.version),
            None => (None, 0),
        }
    }

    /// The most recently committed version of `key`, regardless of snapshot;
    /// used for OCC read-set validation at commit time.
    pub(crate) fn latest_version(&self, storage_id: u64, key: &[u8]) -> u64 {
        self.storages.get(&storage_id).and_then(|s| s.get(key)).and_then(|v| v.last()).map(|v| v.version).unwrap_or(0)
    }

    pub(crate) fn write(
        &mut self,
        storage_id: u64,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
        blob_ids: Vec<u64>,
        version: u64,
    ) {
        let versions = self.storages.entry(storage_id).or_default().entry(key).or_default();
        versions.push(VersionedValue { version, value, blob_ids });
    }

    pub(crate) fn snapshot_entries(&self, storage_id: u64, snapshot: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        let Some(store) = self.storages.get(&storage_id) else {
            return Vec::new();
        };
        store
            .iter()
            .filter_map(|(k, versions)| {
                versions.iter().rev().find(|v| v.version <= snapshot).and_then(|v| v.value.clone()).map(|v| (k.clone(), v))
            })
            .collect()
    }

    pub(crate) fn storage_len(&self, storage_id: u64, snapshot: u64) -> usize {
        self.snapshot_entries(storage_id, snapshot).len()
    }
}

/// Encodes a `storage_id` as the preserve/read-area identifier used in
/// `TransactionOptions`: callers of this backend declare write preserves and
/// read areas using `storage_token(handle.storage_id())` rather than the
/// storage's display name, since the façade never threads names down to
/// `Backend::storage_open`.
pub fn storage_token(storage_id: u64) -> Vec<u8> {
    storage_id.to_be_bytes().to_vec()
}

pub(crate) fn token_to_id(token: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = token.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
