//! Write-Ahead Log (WAL) implementation
//!
//! The log is a directory of append-only segment files. Exactly one segment
//! is active and receives appends; once it grows past the rotation threshold
//! a new segment takes over and the old one becomes immutable history.
//! Replaying every segment in order rebuilds the latest state of every key.

mod entry;
mod manager;
mod naming;
mod reader;
mod segment;
mod writer;

pub use entry::{SegmentEntry, FIELD_DELIMITER};
pub use manager::SegmentManager;
pub use naming::{SegmentName, COMPACTED_PREFIX, SEGMENT_SUFFIX};
pub use reader::{Recovery, ReplayStats};
pub use segment::{truncate_torn_tail, Segment, SegmentEntries};
pub use writer::Wal;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// WAL sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPolicy {
    /// Sync after every write (safest, slowest)
    Immediate,
    /// Sync after N writes
    EveryN(usize),
    /// Sync on interval (trades durability for performance)
    Interval { millis: u64 },
    /// Flush to the OS only, never sync explicitly
    None,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::Immediate
    }
}

/// WAL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalConfig {
    /// Directory for segment files
    pub dir: PathBuf,
    /// Sync policy
    pub sync_policy: SyncPolicy,
    /// Rotate once the active segment is larger than this many bytes
    pub rotation_threshold: u64,
    /// Compact once all segments together are larger than this many bytes
    pub compaction_threshold: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(crate::config::DATA_DIR),
            sync_policy: SyncPolicy::default(),
            rotation_threshold: crate::config::ROTATION_THRESHOLD,
            compaction_threshold: crate::config::COMPACTION_THRESHOLD,
        }
    }
}

impl WalConfig {
    /// Default configuration rooted at `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.rotation_threshold == 0 {
            return Err(crate::KeylogError::Config(
                "rotation_threshold must be positive".into(),
            ));
        }
        if let SyncPolicy::EveryN(0) = self.sync_policy {
            return Err(crate::KeylogError::Config(
                "EveryN sync policy needs a positive count".into(),
            ));
        }
        Ok(())
    }
}
