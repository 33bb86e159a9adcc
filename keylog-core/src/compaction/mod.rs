//! Background compaction: merging two historical segments into one
//!
//! The two inputs are folded oldest-first into a map holding the latest state
//! of every key. Keys whose latest entry is a tombstone are dropped rather
//! than carried forward. The survivors are written to a staged file that is
//! synced and renamed to `compacted_<low>_<high>.log` before the inputs are
//! deleted, so a crash leaves either the inputs or the published output (see
//! [`SegmentManager::cleanup_interrupted_merges`]).

use crate::wal::{Segment, SegmentEntry, SegmentManager, SegmentName};
use crate::{KeylogError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Outcome of one merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Name of the published segment
    pub output: String,
    /// Records read from both inputs
    pub entries_read: usize,
    /// Live keys written to the output
    pub entries_written: usize,
}

/// Latest state of each key seen so far, in key order
#[derive(Debug, Default)]
pub struct MergeState {
    live: BTreeMap<String, String>,
    entries_read: usize,
}

impl MergeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one entry: a tombstone removes the key, a live entry replaces it
    pub fn apply(&mut self, entry: SegmentEntry) {
        self.entries_read += 1;
        if entry.is_deleted {
            self.live.remove(&entry.key);
        } else {
            self.live.insert(entry.key, entry.value.unwrap_or_default());
        }
    }

    /// Apply every entry of a segment, in file order
    pub fn apply_segment(&mut self, segment: Segment) -> Result<()> {
        for entry in segment.into_entries()? {
            self.apply(entry?);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Surviving entries
    pub fn into_entries(self) -> impl Iterator<Item = SegmentEntry> {
        self.live
            .into_iter()
            .map(|(key, value)| SegmentEntry::put(key, value))
    }
}

/// Merge `older` and `newer` into one compacted segment and delete both
pub fn merge_segments(
    manager: &SegmentManager,
    older: &SegmentName,
    newer: &SegmentName,
) -> Result<MergeStats> {
    if older >= newer {
        return Err(KeylogError::Compaction(format!(
            "inputs out of order: {} is not older than {}",
            older, newer
        )));
    }

    let mut state = MergeState::new();
    state.apply_segment(manager.get_segment(older)?)?;
    state.apply_segment(manager.get_segment(newer)?)?;
    let entries_read = state.entries_read;

    let output = SegmentName::compacted(older, newer);
    let staged_path = manager.dir().join(output.temp_file_name());
    let mut merged = Segment::create_staged(staged_path, output)?;

    let mut entries_written = 0;
    for entry in state.into_entries() {
        merged.write_entry(&entry)?;
        entries_written += 1;
    }
    merged.publish(manager.dir())?;

    manager.remove_segment(older)?;
    manager.remove_segment(newer)?;
    merged.close()?;

    info!(
        "Merged {} and {} into {} ({} entries read, {} kept)",
        older, newer, output, entries_read, entries_written
    );

    Ok(MergeStats {
        output: output.file_name(),
        entries_read,
        entries_written,
    })
}
