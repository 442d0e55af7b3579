//! Partition enumeration and per-partition polling of the source log.
//!
//! `SourceLog` discovers the fixed partition set and resolves cursors;
//! `PartitionPoller` fetches batches for exactly one partition. Clients
//! are constructed once at startup and injected into the partition loops.

mod cursor;
mod kafka;

pub use cursor::{CursorTracker, PartitionCursor};
pub use kafka::{KafkaPartitionPoller, KafkaSourceLog};

use crate::config::StartPolicy;
use crate::error::SourceError;
use crate::model::RawRecord;
use async_trait::async_trait;

/// One fetch result: zero or more records plus the cursor for the next
/// call. The next cursor must always be adopted, empty batch or not.
#[derive(Debug)]
pub struct FetchBatch {
    pub records: Vec<RawRecord>,
    pub next_cursor: PartitionCursor,
}

/// A partitioned append-only source log.
#[async_trait]
pub trait SourceLog: Send + Sync {
    /// Discover the fixed set of partitions. An unknown log or a log with
    /// zero partitions is a fatal startup error.
    async fn list_partitions(&self) -> Result<Vec<i32>, SourceError>;

    /// Resolve the starting cursor for a partition. `Latest` begins after
    /// the current tail; `Earliest` begins at the oldest retained record.
    async fn initial_cursor(
        &self,
        partition: i32,
        policy: StartPolicy,
    ) -> Result<PartitionCursor, SourceError>;

    /// Resolve a cursor anchored at the last known position, for recovery
    /// after cursor expiry. Fails with `NotRetained` if the position has
    /// aged out of the log.
    async fn resume_cursor(
        &self,
        partition: i32,
        last_position: i64,
    ) -> Result<PartitionCursor, SourceError>;

    /// Create the poller owning consumption of one partition.
    async fn create_poller(&self, partition: i32)
        -> Result<Box<dyn PartitionPoller>, SourceError>;
}

/// Fetches batches for a single partition. Owned exclusively by one
/// partition loop; never shared.
#[async_trait]
pub trait PartitionPoller: Send {
    /// Fetch the next batch at `cursor`. May block up to the configured
    /// read timeout; a timeout yields an empty batch, which is a normal
    /// outcome, never an error.
    async fn fetch(&mut self, cursor: &PartitionCursor) -> Result<FetchBatch, SourceError>;
}
