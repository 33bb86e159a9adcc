//! Periodic rotation and compaction checks

use crate::wal::Wal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Spawn the rotation check loop on the current runtime
pub(crate) fn spawn_rotation_loop(wal: Arc<Wal>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let wal = wal.clone();
            match tokio::task::spawn_blocking(move || wal.request_rotation_tick()).await {
                Ok(Ok(Some(name))) => debug!("Rotation check switched to {}", name),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("Rotation check failed: {}", e),
                Err(e) => error!("Rotation check panicked: {}", e),
            }
        }
    })
}

/// Spawn the compaction check loop on the current runtime
pub(crate) fn spawn_compaction_loop(wal: Arc<Wal>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let wal = wal.clone();
            match tokio::task::spawn_blocking(move || wal.request_compaction_tick()).await {
                Ok(Ok(Some(stats))) => info!(
                    "Compaction produced {} ({} of {} entries kept)",
                    stats.output, stats.entries_written, stats.entries_read
                ),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("Compaction check failed: {}", e),
                Err(e) => error!("Compaction check panicked: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{SegmentEntry, SegmentName, WalConfig};
    use std::fs;
    use tempfile::TempDir;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
            time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_loop_rotates_oversized_segment() {
        let temp_dir = TempDir::new().unwrap();
        // already past the threshold when opened, so no append rotates it
        fs::write(temp_dir.path().join("000001.log"), "a,1,false\nb,2,false\n").unwrap();
        let wal = Arc::new(
            Wal::open(WalConfig {
                rotation_threshold: 10,
                ..WalConfig::with_dir(temp_dir.path())
            })
            .unwrap(),
        );
        let period = Duration::from_secs(5);

        let task = spawn_rotation_loop(wal.clone(), period);
        settle().await;
        assert_eq!(wal.active_segment_name().unwrap(), SegmentName::plain(1));

        time::advance(period).await;
        settle().await;
        assert_eq!(wal.active_segment_name().unwrap(), SegmentName::plain(2));

        // an empty active segment is left alone
        time::advance(period).await;
        settle().await;
        assert_eq!(wal.active_segment_name().unwrap(), SegmentName::plain(2));
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_compaction_loop_merges_oldest_pair() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Arc::new(
            Wal::open(WalConfig {
                compaction_threshold: 10,
                ..WalConfig::with_dir(temp_dir.path())
            })
            .unwrap(),
        );
        wal.append(&SegmentEntry::put("a", "1")).unwrap();
        wal.rotate().unwrap();
        wal.append(&SegmentEntry::put("b", "2")).unwrap();
        wal.rotate().unwrap();
        let period = Duration::from_secs(10);

        let task = spawn_compaction_loop(wal.clone(), period);
        settle().await;
        assert_eq!(wal.segment_names().unwrap().len(), 3);

        time::advance(period).await;
        settle().await;
        assert_eq!(
            wal.segment_names().unwrap(),
            vec![SegmentName::Compacted { low: 1, high: 2 }, SegmentName::plain(3)]
        );
        task.abort();
    }
}
