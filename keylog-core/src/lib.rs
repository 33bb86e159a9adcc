//! keylog core - embedded key-value store on a segmented write-ahead log
//!
//! # Architecture
//!
//! - **WAL (Write-Ahead Log)**: append-only segment files in one data
//!   directory; the active segment rotates once it passes a size threshold
//! - **Compaction**: merges the two oldest historical segments, keeping only
//!   the latest value of each key and dropping deleted keys
//! - **Index**: in-memory map rebuilt at startup by replaying every segment
//! - **Storage engine**: `Db` facade with `set`, `get`, `delete` and the
//!   background rotation and compaction checks
//!
//! Records are text lines `key,value,is_deleted`. Keys and values may not
//! contain `,` or line breaks.

pub mod compaction;
pub mod index;
pub mod storage;
pub mod wal;

mod error;

pub use error::{KeylogError, Result};
pub use storage::{Db, DbConfig, DbStats};
pub use wal::{SegmentEntry, SegmentName, Wal, WalConfig};

/// keylog version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Default segment directory, relative to the working directory
    pub const DATA_DIR: &str = "data/wal";

    /// Rotate the active segment once it exceeds this size (1KB)
    pub const ROTATION_THRESHOLD: u64 = 1024;

    /// Compact once all segments together exceed this size
    pub const COMPACTION_THRESHOLD: u64 = 3000;

    /// Seconds between background rotation checks
    pub const ROTATION_CHECK_INTERVAL_SECS: u64 = 5;

    /// Seconds between background compaction checks
    pub const COMPACTION_CHECK_INTERVAL_SECS: u64 = 10;
}
