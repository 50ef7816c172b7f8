//! Configuration surfaces: database open options, per-transaction options,
//! and per-storage options.

use std::collections::{HashMap, HashSet};

use crate::status::TransactionType;

/// String-keyed database attributes (§6.2), with typed accessors for the
/// well-known keys.
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    attributes: HashMap<String, String>,
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a raw attribute, returning `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Filesystem path for persistent backends.
    pub fn location(&self) -> Option<&str> {
        self.get("location")
    }

    /// Whether the in-process backend's coarse transaction mutex is enabled.
    /// Defaults to `true` when unset.
    pub fn lock_enabled(&self) -> bool {
        match self.get("lock") {
            Some(v) => matches!(v, "true" | "1"),
            None => true,
        }
    }

    /// Whether call-count/timing tracking is enabled.
    pub fn perf_tracking(&self) -> bool {
        matches!(self.get("perf"), Some("true") | Some("1"))
    }

    /// Whether the CC backend should open in maintenance mode.
    pub fn maintenance_mode(&self) -> bool {
        self.get("startup_mode") == Some("maintenance")
    }

    /// An integer knob, parsed from the attribute map; `None` if unset or
    /// unparsable.
    pub fn integer(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn epoch_duration(&self) -> Option<u64> {
        self.integer("epoch_duration")
    }

    pub fn waiting_resolver_threads(&self) -> Option<u64> {
        self.integer("waiting_resolver_threads")
    }

    pub fn recover_max_parallelism(&self) -> Option<u64> {
        self.integer("recover_max_parallelism")
    }

    pub fn index_restore_threads(&self) -> Option<u64> {
        self.integer("index_restore_threads")
    }
}

/// Per-transaction options: the requested [`TransactionType`] plus, for long
/// and read-only transactions, the storages it is permitted to touch.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    pub transaction_type: TransactionType,
    /// Storages this long transaction declares it will write to.
    pub write_preserves: HashSet<Vec<u8>>,
    /// Storages a read-only transaction may read, inclusive of unlisted ones
    /// unless `read_area_exclusive` is also used.
    pub read_area_inclusive: HashSet<Vec<u8>>,
    /// Storages a read-only transaction may not read.
    pub read_area_exclusive: HashSet<Vec<u8>>,
}

impl TransactionOptions {
    pub fn short() -> Self {
        Self { transaction_type: TransactionType::Short, ..Default::default() }
    }

    pub fn read_only() -> Self {
        Self { transaction_type: TransactionType::ReadOnly, ..Default::default() }
    }

    pub fn long(write_preserves: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            transaction_type: TransactionType::Long,
            write_preserves: write_preserves.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_read_area_inclusive(mut self, storages: impl IntoIterator<Item = Vec<u8>>) -> Self {
        self.read_area_inclusive.extend(storages);
        self
    }

    pub fn with_read_area_exclusive(mut self, storages: impl IntoIterator<Item = Vec<u8>>) -> Self {
        self.read_area_exclusive.extend(storages);
        self
    }

    /// Whether `storage` is covered by this transaction's write preserves.
    pub fn preserves(&self, storage: &[u8]) -> bool {
        self.write_preserves.iter().any(|s| s.as_slice() == storage)
    }

    /// Whether a read-only transaction may read `storage` under its read
    /// area restrictions.
    pub fn read_area_allows(&self, storage: &[u8]) -> bool {
        if self.read_area_exclusive.iter().any(|s| s.as_slice() == storage) {
            return false;
        }
        if self.read_area_inclusive.is_empty() {
            return true;
        }
        self.read_area_inclusive.iter().any(|s| s.as_slice() == storage)
    }
}

/// A storage-sized opaque payload attached to a storage record, plus its
/// requested id (`None` means "assign one").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageOptions {
    pub storage_id: Option<u64>,
    pub payload: Vec<u8>,
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage_id(mut self, id: u64) -> Self {
        self.storage_id = Some(id);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }
}
