#![forbid(unsafe_code)]

use crate::StoreError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_FILE_NAME: &str = "graphwrite.db";
pub const DEFAULT_STORAGE_DIR: &str = ".graphwrite";
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SNAPSHOT_CACHE_CAPACITY: usize = 256;

pub const ENV_STORAGE_DIR: &str = "GRAPHWRITE_STORAGE_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "GRAPHWRITE_BUSY_TIMEOUT_MS";
pub const ENV_SNAPSHOT_CACHE: &str = "GRAPHWRITE_SNAPSHOT_CACHE";
pub const ENV_MAX_CHAIN_DEPTH: &str = "GRAPHWRITE_MAX_CHAIN_DEPTH";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    storage_dir: PathBuf,
    busy_timeout: Duration,
    snapshot_cache_capacity: usize,
    max_chain_depth: Option<usize>,
}

impl StoreConfig {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            snapshot_cache_capacity: DEFAULT_SNAPSHOT_CACHE_CAPACITY,
            max_chain_depth: None,
        }
    }

    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let storage_dir = lookup(ENV_STORAGE_DIR)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_DIR.to_string());
        let mut config = Self::new(storage_dir);

        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            let ms = parse_positive(&raw, "GRAPHWRITE_BUSY_TIMEOUT_MS must be a positive integer")?;
            config.busy_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(raw) = lookup(ENV_SNAPSHOT_CACHE) {
            config.snapshot_cache_capacity = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidInput("GRAPHWRITE_SNAPSHOT_CACHE must be an integer"))?;
        }
        if let Some(raw) = lookup(ENV_MAX_CHAIN_DEPTH) {
            config.max_chain_depth = Some(parse_positive(
                &raw,
                "GRAPHWRITE_MAX_CHAIN_DEPTH must be a positive integer",
            )?);
        }
        Ok(config)
    }

    pub fn with_storage_dir(mut self, storage_dir: impl AsRef<Path>) -> Self {
        self.storage_dir = storage_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Zero disables snapshot memoization.
    pub fn with_snapshot_cache_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_cache_capacity = capacity;
        self
    }

    /// Caps the uncached ancestor hops a single read may fold. Unbounded by default.
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = Some(depth.max(1));
        self
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(DB_FILE_NAME)
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    pub fn snapshot_cache_capacity(&self) -> usize {
        self.snapshot_cache_capacity
    }

    pub fn max_chain_depth(&self) -> Option<usize> {
        self.max_chain_depth
    }
}

fn parse_positive(raw: &str, message: &'static str) -> Result<usize, StoreError> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(StoreError::InvalidInput(message)),
    }
}
