//! WAL writer: the active segment, rotation and compaction triggers

use super::{truncate_torn_tail, Recovery, Segment, SegmentEntry, SegmentManager, SegmentName};
use super::{SyncPolicy, WalConfig};
use crate::compaction::MergeStats;
use crate::{KeylogError, Result};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Write-ahead log over a directory of segments.
///
/// Every operation that touches the active segment or changes the set of
/// segments on disk runs under one lock, so appends, rotation and the
/// list-select-merge sequence of compaction never interleave.
pub struct Wal {
    config: WalConfig,
    manager: SegmentManager,
    inner: Mutex<WalInner>,
}

struct WalInner {
    active: Option<Segment>,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl WalInner {
    fn active(&mut self) -> Result<&mut Segment> {
        self.active.as_mut().ok_or(KeylogError::Closed)
    }
}

impl Wal {
    /// Open the log in `config.dir`.
    ///
    /// Leftovers of interrupted merges are removed and an incomplete final
    /// record in the newest segment is truncated before that segment is
    /// reopened as the active one. An empty directory starts at `000001.log`.
    pub fn open(config: WalConfig) -> Result<Self> {
        config.validate()?;
        let manager = SegmentManager::new(&config.dir)?;

        let removed = manager.cleanup_interrupted_merges()?;
        if removed > 0 {
            info!("Removed {} files left by interrupted merges", removed);
        }

        let active = Self::open_active(&manager)?;
        info!("Opened WAL in {:?}, active segment {}", config.dir, active.name());

        Ok(Self {
            config,
            manager,
            inner: Mutex::new(WalInner {
                active: Some(active),
                writes_since_sync: 0,
                last_sync: Instant::now(),
            }),
        })
    }

    fn open_active(manager: &SegmentManager) -> Result<Segment> {
        match manager.try_list_segments()?.last() {
            Some(name @ SegmentName::Plain(_)) => {
                truncate_torn_tail(&manager.dir().join(name.file_name()))?;
                Segment::open_append(manager.dir(), *name)
            }
            // merge outputs are never appended to
            Some(SegmentName::Compacted { .. }) | None => manager.create_segment(),
        }
    }

    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    pub fn manager(&self) -> &SegmentManager {
        &self.manager
    }

    /// Append an entry to the active segment.
    ///
    /// The entry is written first and the rotation threshold checked after,
    /// so the entry that crosses the threshold stays in the segment it
    /// filled. Once the entry is written the append has succeeded: a failed
    /// rotation is logged and retried by the next append or rotation tick.
    pub fn append(&self, entry: &SegmentEntry) -> Result<()> {
        entry.validate()?;
        let mut inner = self.inner.lock();

        if inner.active()?.is_poisoned() {
            let name = self.rotate_locked(&mut inner)?;
            warn!("Replaced poisoned active segment with {}", name);
        }

        inner.active()?.write_entry(entry)?;
        inner.writes_since_sync += 1;

        if self.should_sync(&inner) {
            inner.active()?.sync()?;
            inner.writes_since_sync = 0;
            inner.last_sync = Instant::now();
        }

        if let Err(e) = self.rotate_if_full_locked(&mut inner) {
            warn!("Rotation after append failed, will retry: {}", e);
        }

        Ok(())
    }

    /// Force data of the active segment down to disk
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.active()?.sync()?;
        inner.writes_since_sync = 0;
        inner.last_sync = Instant::now();
        Ok(())
    }

    /// Name of the segment currently receiving appends
    pub fn active_segment_name(&self) -> Result<SegmentName> {
        let mut inner = self.inner.lock();
        Ok(*inner.active()?.name())
    }

    /// All segments in replay order
    pub fn segment_names(&self) -> Result<Vec<SegmentName>> {
        let _inner = self.inner.lock();
        self.manager.try_list_segments()
    }

    /// Rotate unconditionally; returns the new active segment
    pub fn rotate(&self) -> Result<SegmentName> {
        let mut inner = self.inner.lock();
        self.rotate_locked(&mut inner)
    }

    /// Rotate if the active segment has outgrown the threshold
    pub fn request_rotation_tick(&self) -> Result<Option<SegmentName>> {
        let mut inner = self.inner.lock();
        self.rotate_if_full_locked(&mut inner)
    }

    /// Total bytes held by all segments
    pub fn total_size(&self) -> Result<u64> {
        let _inner = self.inner.lock();
        self.total_size_locked()
    }

    /// Merge the two oldest historical segments if the log has outgrown the
    /// compaction threshold
    pub fn request_compaction_tick(&self) -> Result<Option<MergeStats>> {
        let mut inner = self.inner.lock();
        let total = self.total_size_locked()?;
        if total <= self.config.compaction_threshold {
            debug!(
                "Total WAL size {} within compaction threshold {}",
                total, self.config.compaction_threshold
            );
            return Ok(None);
        }
        self.compact_locked(&mut inner)
    }

    /// Merge the two oldest historical segments regardless of size
    pub fn compact(&self) -> Result<Option<MergeStats>> {
        let mut inner = self.inner.lock();
        self.compact_locked(&mut inner)
    }

    /// Iterate every segment in replay order.
    ///
    /// The listing is taken when this is called and segments are opened as
    /// the iteration reaches them. A merge that runs before the iteration
    /// finishes deletes listed segments, which then fail with a `NotFound`
    /// I/O error; replay before starting maintenance.
    pub fn recover(&self) -> Result<Recovery> {
        let _inner = self.inner.lock();
        let names = self.manager.try_list_segments()?;
        Ok(Recovery::new(self.manager.clone(), names))
    }

    /// Sync and release the active segment; later appends fail with
    /// [`KeylogError::Closed`]
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(mut active) = inner.active.take() {
            active.sync()?;
            let name = *active.name();
            active.close()?;
            info!("Closed WAL, last active segment {}", name);
        }
        Ok(())
    }

    fn should_sync(&self, inner: &WalInner) -> bool {
        match self.config.sync_policy {
            SyncPolicy::Immediate => true,
            SyncPolicy::EveryN(n) => inner.writes_since_sync >= n,
            SyncPolicy::Interval { millis } => {
                inner.last_sync.elapsed().as_millis() >= millis as u128
            }
            SyncPolicy::None => false,
        }
    }

    fn rotate_if_full_locked(&self, inner: &mut WalInner) -> Result<Option<SegmentName>> {
        if inner.active()?.size()? > self.config.rotation_threshold {
            return self.rotate_locked(inner).map(Some);
        }
        Ok(None)
    }

    fn rotate_locked(&self, inner: &mut WalInner) -> Result<SegmentName> {
        let active = inner.active()?;
        if !active.is_poisoned() {
            active.sync()?;
        }

        let next = self.manager.create_segment()?;
        let next_name = *next.name();
        if let Some(previous) = inner.active.replace(next) {
            let size = previous.size()?;
            info!(
                "Rotated segment {} ({} bytes), now appending to {}",
                previous.name(),
                size,
                next_name
            );
            previous.close()?;
        }
        inner.writes_since_sync = 0;
        inner.last_sync = Instant::now();

        Ok(next_name)
    }

    fn total_size_locked(&self) -> Result<u64> {
        let mut total = 0;
        for name in self.manager.try_list_segments()? {
            total += self.manager.segment_size(&name)?;
        }
        Ok(total)
    }

    fn compact_locked(&self, inner: &mut WalInner) -> Result<Option<MergeStats>> {
        let active = *inner.active()?.name();
        let candidates: Vec<SegmentName> = self
            .manager
            .try_list_segments()?
            .into_iter()
            .filter(|name| *name != active)
            .collect();

        if candidates.len() < 2 {
            debug!(
                "Skipping compaction: {} historical segment(s)",
                candidates.len()
            );
            return Ok(None);
        }

        self.manager
            .merge_segments(&candidates[0], &candidates[1])
            .map(Some)
    }
}
