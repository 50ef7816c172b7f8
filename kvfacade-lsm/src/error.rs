use kvfacade_core::StatusCode;

/// Wraps the engine's native error type, mirroring how `kvdb-rocksdb`
/// threads `rocksdb::Error` through an `other_io_err` shim, except kept as a
/// typed error via `thiserror` rather than collapsed straight to `io::Error`.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for StatusCode {
    fn from(err: BackendError) -> Self {
        log::warn!("lsm backend error: {err}");
        StatusCode::ErrIoError
    }
}
