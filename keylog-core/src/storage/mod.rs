//! Storage engine - composes the WAL and the in-memory index

mod engine;
mod maintenance;

pub use engine::{Db, DbStats};

use crate::wal::WalConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// WAL configuration (includes the data directory)
    pub wal: WalConfig,
    /// How often the background task checks the active segment size
    pub rotation_check_interval: Duration,
    /// How often the background task checks whether to compact
    pub compaction_check_interval: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            wal: WalConfig::default(),
            rotation_check_interval: Duration::from_secs(
                crate::config::ROTATION_CHECK_INTERVAL_SECS,
            ),
            compaction_check_interval: Duration::from_secs(
                crate::config::COMPACTION_CHECK_INTERVAL_SECS,
            ),
        }
    }
}

impl DbConfig {
    /// Default configuration storing segments in `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            wal: WalConfig::with_dir(dir),
            ..Default::default()
        }
    }
}
