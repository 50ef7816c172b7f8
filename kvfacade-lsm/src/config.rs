const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const DB_DEFAULT_MEMORY_BUDGET_MB: u64 = 128;

/// Construction-time configuration for [`crate::LsmBackend`], mirroring
/// `kvdb_sled::DatabaseConfig`.
pub struct DatabaseConfig {
    pub path: String,
    pub cache_capacity_mb: Option<u64>,
    pub flush_every_ms: Option<u64>,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<String>) -> Self {
        DatabaseConfig { path: path.into(), cache_capacity_mb: None, flush_every_ms: Some(1_000) }
    }

    pub fn cache_capacity(&self) -> u64 {
        self.cache_capacity_mb.unwrap_or(DB_DEFAULT_MEMORY_BUDGET_MB) * MB
    }
}

impl From<&kvfacade_core::DatabaseOptions> for DatabaseConfig {
    fn from(options: &kvfacade_core::DatabaseOptions) -> Self {
        let mut config = DatabaseConfig::new(options.location().unwrap_or("kvfacade-lsm.db"));
        config.cache_capacity_mb = options.integer("cache_capacity_mb");
        if let Some(ms) = options.integer("flush_every_ms") {
            config.flush_every_ms = Some(ms);
        }
        config
    }
}
