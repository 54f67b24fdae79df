#![forbid(unsafe_code)]

mod apply;
mod continuity;
mod diff;
mod error;
mod materialize;
mod projects;
mod records;
mod requests;
mod snapshots;
mod support;
mod versions;

pub use error::StoreError;
pub use requests::*;
pub use snapshots::SnapshotCacheStats;

use crate::StoreConfig;
use rusqlite::Connection;
use snapshots::SnapshotCache;
use std::path::Path;
use support::*;

/// SQLite-backed versioned narrative graph.
///
/// Each handle owns one connection plus a private snapshot cache. Several handles may
/// share one database directory; SQLite serializes their writers.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    config: StoreConfig,
    snapshots: SnapshotCache,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(StoreConfig::new(storage_dir))
    }

    pub fn open_with_config(config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(config.storage_dir())?;

        let conn = Connection::open(config.db_path())?;
        conn.busy_timeout(config.busy_timeout())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        tracing::debug!(
            db_path = %config.db_path().display(),
            snapshot_cache_capacity = config.snapshot_cache_capacity(),
            "graph store opened"
        );

        let snapshots = SnapshotCache::new(config.snapshot_cache_capacity());
        Ok(Self {
            conn,
            config,
            snapshots,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        self.config.storage_dir()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn snapshot_cache_stats(&self) -> SnapshotCacheStats {
        self.snapshots.stats()
    }
}
