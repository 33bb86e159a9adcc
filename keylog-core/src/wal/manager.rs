//! Segment directory management
//!
//! The manager owns no entry data; it only lists, opens, creates, deletes and
//! merges segment files inside one data directory.

use super::naming::{SEGMENT_SUFFIX, TEMP_SUFFIX};
use super::{Segment, SegmentName};
use crate::compaction::{self, MergeStats};
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File-level operations on the segments of a data directory
#[derive(Debug, Clone)]
pub struct SegmentManager {
    dir: PathBuf,
}

impl SegmentManager {
    /// Create a manager for `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List segments sorted in replay order.
    ///
    /// Fails on directory I/O errors and on `.log` files whose names do not
    /// parse, since skipping such a file could hide committed data.
    pub fn try_list_segments(&self) -> Result<Vec<SegmentName>> {
        let mut segments = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.ends_with(SEGMENT_SUFFIX) {
                segments.push(SegmentName::parse(&name)?);
            }
        }

        segments.sort();
        Ok(segments)
    }

    /// Segment file names in replay order; the last one is the newest.
    ///
    /// Never fails: a listing error is logged and reported as no segments.
    /// Use [`SegmentManager::try_list_segments`] to tell the two apart.
    pub fn list_segment_names(&self) -> Vec<String> {
        match self.try_list_segments() {
            Ok(segments) => segments.iter().map(SegmentName::file_name).collect(),
            Err(e) => {
                warn!("Failed to list segments in {:?}: {}", self.dir, e);
                Vec::new()
            }
        }
    }

    /// Open the newest segment for appending, `None` on first run
    pub fn latest_segment(&self) -> Result<Option<Segment>> {
        match self.try_list_segments()?.last() {
            Some(name) => Segment::open_append(&self.dir, *name).map(Some),
            None => Ok(None),
        }
    }

    /// Open a segment read-only
    pub fn get_segment(&self, name: &SegmentName) -> Result<Segment> {
        Segment::open_read(&self.dir, *name)
    }

    /// Create the next plain segment and open it for appending
    pub fn create_segment(&self) -> Result<Segment> {
        let next = match self.try_list_segments()?.last() {
            Some(latest) => latest.next_plain(),
            None => SegmentName::plain(1),
        };
        info!("Creating segment {}", next);
        Segment::open_append(&self.dir, next)
    }

    /// Close a segment and remove its file
    pub fn delete_segment(&self, segment: Segment) -> Result<()> {
        let name = *segment.name();
        segment.close()?;
        self.remove_segment(&name)
    }

    /// Remove a segment file that is not open
    pub fn remove_segment(&self, name: &SegmentName) -> Result<()> {
        fs::remove_file(self.dir.join(name.file_name()))?;
        debug!("Removed segment {}", name);
        Ok(())
    }

    /// Merge two segments, given oldest first, into a compacted segment and
    /// delete both inputs
    pub fn merge_segments(&self, older: &SegmentName, newer: &SegmentName) -> Result<MergeStats> {
        compaction::merge_segments(self, older, newer)
    }

    /// Size of a segment file in bytes
    pub fn segment_size(&self, name: &SegmentName) -> Result<u64> {
        Ok(fs::metadata(self.dir.join(name.file_name()))?.len())
    }

    /// Remove the leftovers of merges interrupted by a crash.
    ///
    /// Unpublished merge outputs are discarded. Once a merge output is
    /// published, its inputs are the segments whose ordering keys equal its
    /// `low` and `high` numbers; any of those still present are removed.
    /// Returns the number of files removed.
    pub fn cleanup_interrupted_merges(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.ends_with(TEMP_SUFFIX) && entry.file_type()?.is_file() {
                warn!("Removing unpublished merge output {}", name);
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        let segments = self.try_list_segments()?;
        for merged in segments.iter().filter(|s| s.is_compacted()) {
            let SegmentName::Compacted { low, high } = *merged else {
                continue;
            };
            for stale in segments.iter().filter(|s| {
                *s != merged && (s.ordering_key() == low || s.ordering_key() == high)
            }) {
                let path = self.dir.join(stale.file_name());
                if path.exists() {
                    warn!("Removing segment {} already merged into {}", stale, merged);
                    fs::remove_file(path)?;
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}
