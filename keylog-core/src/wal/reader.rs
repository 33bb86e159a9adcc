//! WAL reader for recovery

use super::{SegmentEntries, SegmentEntry, SegmentManager, SegmentName};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::vec;
use tracing::{debug, info};

/// Replay of every segment, oldest first.
///
/// Yields each segment name with a lazy iterator over its entries. Segments
/// are opened only when reached. The newest segment is read with torn-tail
/// tolerance, since a crash can only have interrupted a write there.
///
/// The segment list is fixed when the replay is created. A merge that
/// deletes a listed segment before it is reached makes that step fail with
/// a `NotFound` I/O error, so replay must finish before compaction runs.
pub struct Recovery {
    manager: SegmentManager,
    pending: vec::IntoIter<SegmentName>,
}

/// Counters from a completed replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStats {
    pub segments: usize,
    pub entries: usize,
}

impl Recovery {
    pub(crate) fn new(manager: SegmentManager, names: Vec<SegmentName>) -> Self {
        Self {
            manager,
            pending: names.into_iter(),
        }
    }

    /// Segments not yet reached, in replay order
    pub fn remaining(&self) -> &[SegmentName] {
        self.pending.as_slice()
    }

    /// Feed every entry, in replay order, to `apply`
    pub fn replay<F>(self, mut apply: F) -> Result<ReplayStats>
    where
        F: FnMut(SegmentEntry),
    {
        let mut stats = ReplayStats::default();
        for segment in self {
            let (name, entries) = segment?;
            let mut count = 0;
            for entry in entries {
                apply(entry?);
                count += 1;
            }
            debug!("Replayed {} entries from {}", count, name);
            stats.segments += 1;
            stats.entries += count;
        }
        info!(
            "Recovered {} entries from {} segments",
            stats.entries, stats.segments
        );
        Ok(stats)
    }
}

impl Iterator for Recovery {
    type Item = Result<(SegmentName, SegmentEntries<BufReader<File>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.pending.next()?;
        let is_newest = self.pending.len() == 0;
        let opened = self
            .manager
            .get_segment(&name)
            .and_then(|segment| segment.into_entries())
            .map(|entries| (name, entries.tolerate_torn_tail(is_newest)));
        Some(opened)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pending.size_hint()
    }
}
