//! Name → storage-record map with id and opaque payload, plus a concurrent
//! lookup cache (§4.3).

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::Backend;
use crate::handle::{StorageHandle, StorageRecordInner};
use crate::options::StorageOptions;
use crate::status::StatusCode;

/// Safe for arbitrary concurrent callers; writers (`create`/`delete`)
/// serialize against each other and against the cache, readers proceed
/// concurrently.
pub(crate) struct StorageRegistry {
    by_name: RwLock<HashMap<Vec<u8>, StorageHandle>>,
}

impl StorageRegistry {
    pub(crate) fn new() -> Self {
        Self { by_name: RwLock::new(HashMap::new()) }
    }

    pub(crate) fn create(
        &self,
        backend: &dyn Backend,
        name: &[u8],
        mut options: StorageOptions,
    ) -> Result<StorageHandle, StatusCode> {
        if name.is_empty() {
            return Err(StatusCode::ErrInvalidArgument);
        }
        let mut map = self.by_name.write();
        if map.contains_key(name) {
            return Err(StatusCode::AlreadyExists);
        }
        let storage_id = options.storage_id.unwrap_or_else(|| backend.allocate_storage_id());
        backend.storage_open(storage_id)?;
        options.storage_id = Some(storage_id);
        let handle = StorageHandle {
            inner: Arc::new(StorageRecordInner {
                storage_id,
                name: name.to_vec(),
                options: RwLock::new(options),
                deleted: std::sync::atomic::AtomicBool::new(false),
            }),
        };
        map.insert(name.to_vec(), handle.clone());
        Ok(handle)
    }

    pub(crate) fn get(&self, name: &[u8]) -> Result<StorageHandle, StatusCode> {
        self.by_name.read().get(name).cloned().ok_or(StatusCode::NotFound)
    }

    pub(crate) fn delete(&self, backend: &dyn Backend, handle: &StorageHandle) -> Result<(), StatusCode> {
        let mut map = self.by_name.write();
        match map.remove(&handle.inner.name) {
            Some(_) => {
                handle.inner.deleted.store(true, Ordering::Release);
                backend.storage_close(handle.inner.storage_id)
            }
            None => Err(StatusCode::NotFound),
        }
    }

    pub(crate) fn list(&self) -> Vec<Vec<u8>> {
        self.by_name.read().keys().cloned().collect()
    }

    pub(crate) fn get_options(&self, handle: &StorageHandle) -> StorageOptions {
        handle.inner.options.read().clone()
    }

    pub(crate) fn set_options(&self, handle: &StorageHandle, options: StorageOptions) {
        *handle.inner.options.write() = options;
    }
}
