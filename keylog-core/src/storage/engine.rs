//! Storage engine - top-level coordinator

use super::maintenance;
use super::DbConfig;
use crate::index::KeyValueIndex;
use crate::wal::{SegmentEntry, Wal};
use crate::{KeylogError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// keylog storage engine
pub struct Db {
    config: DbConfig,
    wal: Arc<Wal>,
    index: KeyValueIndex,
    // orders each log append with its index update
    write_lock: Mutex<()>,
    maintenance: Mutex<Vec<JoinHandle<()>>>,
}

impl Db {
    /// Open the store, replaying every segment into the index before
    /// returning
    pub fn open(config: DbConfig) -> Result<Self> {
        let wal = Wal::open(config.wal.clone())?;
        let index = KeyValueIndex::new();

        let stats = wal.recover()?.replay(|entry| index.apply(entry))?;
        info!(
            "Loaded {} keys from {} entries in {} segments",
            index.len(),
            stats.entries,
            stats.segments
        );

        Ok(Self {
            config,
            wal: Arc::new(wal),
            index,
            write_lock: Mutex::new(()),
            maintenance: Mutex::new(Vec::new()),
        })
    }

    /// Open the store and start the background maintenance loops
    pub fn open_with_maintenance(config: DbConfig) -> Result<Self> {
        let db = Self::open(config)?;
        db.start_maintenance()?;
        Ok(db)
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    /// Set `key` to `value`
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry = SegmentEntry::put(key, value);
        let _guard = self.write_lock.lock();
        self.wal.append(&entry)?;
        self.index.apply(entry);
        Ok(())
    }

    /// Latest value of `key`, `None` if absent or deleted
    pub fn get(&self, key: &str) -> Option<String> {
        self.index.get(key)
    }

    /// Delete `key`; a tombstone is logged even if the key is absent
    pub fn delete(&self, key: &str) -> Result<()> {
        let entry = SegmentEntry::tombstone(key);
        let _guard = self.write_lock.lock();
        self.wal.append(&entry)?;
        self.index.apply(entry);
        Ok(())
    }

    /// Start the rotation and compaction check loops.
    ///
    /// Must be called from within a tokio runtime. The loops run until the
    /// engine is closed or dropped.
    pub fn start_maintenance(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(KeylogError::Config(
                "maintenance loops need a running tokio runtime".into(),
            ));
        }

        let mut tasks = self.maintenance.lock();
        if !tasks.is_empty() {
            return Ok(());
        }
        tasks.push(maintenance::spawn_rotation_loop(
            self.wal.clone(),
            self.config.rotation_check_interval,
        ));
        tasks.push(maintenance::spawn_compaction_loop(
            self.wal.clone(),
            self.config.compaction_check_interval,
        ));
        info!(
            "Started maintenance: rotation every {:?}, compaction every {:?}",
            self.config.rotation_check_interval, self.config.compaction_check_interval
        );
        Ok(())
    }

    /// Get engine statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            keys: self.index.len(),
            segments: self.wal.segment_names()?.len(),
            total_size_bytes: self.wal.total_size()?,
            active_segment: self.wal.active_segment_name()?.file_name(),
        })
    }

    /// Stop maintenance and close the active segment
    pub fn close(&self) -> Result<()> {
        self.stop_maintenance();
        let _guard = self.write_lock.lock();
        self.wal.close()
    }

    fn stop_maintenance(&self) {
        for task in self.maintenance.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.stop_maintenance();
    }
}

/// Storage engine statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStats {
    pub keys: usize,
    pub segments: usize,
    pub total_size_bytes: u64,
    pub active_segment: String,
}
