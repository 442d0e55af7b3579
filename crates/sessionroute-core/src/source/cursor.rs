//! Cursor tracking for source partitions.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Read position within one partition.
///
/// Owned exclusively by one partition loop for the process's runtime; no
/// durable checkpoint is kept. Every fetch returns a replacement cursor
/// and the old one must not be reused.
#[derive(Debug, Clone)]
pub struct PartitionCursor {
    partition: i32,
    position: i64,
    last_advance: Instant,
}

impl PartitionCursor {
    /// Create a cursor at a resolved position.
    pub fn new(partition: i32, position: i64) -> Self {
        Self {
            partition,
            position,
            last_advance: Instant::now(),
        }
    }

    /// The partition this cursor reads.
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// The next position to read. Opaque to everything but the source
    /// implementation that minted it.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// The replacement cursor after a fetch. Also minted for empty
    /// batches, where the position may be unchanged but the advance time
    /// is refreshed.
    pub fn advanced_to(&self, position: i64) -> Self {
        Self {
            partition: self.partition,
            position,
            last_advance: Instant::now(),
        }
    }

    /// Time since the cursor last advanced.
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_advance.elapsed()
    }
}

/// Tracks per-partition read positions and publish counts across loops.
///
/// Observability only: positions are not checkpoints and do not survive a
/// restart. The engine logs the final snapshot at shutdown.
pub struct CursorTracker {
    positions: DashMap<i32, AtomicI64>,
    published: DashMap<i32, AtomicU64>,
}

impl CursorTracker {
    /// Create a new tracker.
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
            published: DashMap::new(),
        }
    }

    /// Record the current read position for a partition.
    pub fn record_position(&self, partition: i32, position: i64) {
        self.positions
            .entry(partition)
            .and_modify(|v| v.store(position, Ordering::SeqCst))
            .or_insert_with(|| AtomicI64::new(position));
    }

    /// Get the current read position for a partition.
    pub fn position(&self, partition: i32) -> Option<i64> {
        self.positions.get(&partition).map(|v| v.load(Ordering::SeqCst))
    }

    /// Record one published record for a partition.
    pub fn record_published(&self, partition: i32) {
        self.published
            .entry(partition)
            .and_modify(|v| {
                v.fetch_add(1, Ordering::Relaxed);
            })
            .or_insert_with(|| AtomicU64::new(1));
    }

    /// Published record count for a partition.
    pub fn published(&self, partition: i32) -> u64 {
        self.published
            .get(&partition)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Total published records across all partitions.
    pub fn total_published(&self) -> u64 {
        self.published
            .iter()
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .sum()
    }

    /// Snapshot of all tracked positions, for shutdown logging.
    pub fn snapshot(&self) -> Vec<(i32, i64)> {
        let mut positions: Vec<(i32, i64)> = self
            .positions
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::SeqCst)))
            .collect();
        positions.sort_by_key(|(partition, _)| *partition);
        positions
    }
}

impl Default for CursorTracker {
    fn default() -> Self {
        Self::new()
    }
}
