//! In-memory source and destination logs.
//!
//! Deterministic stand-ins for the Kafka transports, used by the test
//! suite and handy for local experiments. Semantics mirror the real
//! transports: per-partition sequences, cursor expiry below the retained
//! horizon, empty batches at the tail.

use crate::config::StartPolicy;
use crate::error::{PublishError, SourceError};
use crate::model::RawRecord;
use crate::publish::DestinationLog;
use crate::source::{FetchBatch, PartitionCursor, PartitionPoller, SourceLog};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct PartitionState {
    records: Vec<Vec<u8>>,
    /// Oldest retained position; fetches below it fail like an expired cursor
    retained_from: i64,
    /// Force the next fetch to fail with `CursorExpired` (cleared on use)
    expire_next_fetch: bool,
    /// Force resume attempts to fail with `NotRetained`
    fail_resume: bool,
    /// Position of every fetch call, for asserting cursor adoption in tests
    fetch_positions: Vec<i64>,
}

/// In-memory partitioned source log.
pub struct InMemorySource {
    partitions: Vec<Arc<Mutex<PartitionState>>>,
    batch_size: usize,
}

impl InMemorySource {
    /// Create a source with a fixed number of partitions.
    pub fn new(partition_count: usize, batch_size: usize) -> Self {
        Self {
            partitions: (0..partition_count)
                .map(|_| {
                    Arc::new(Mutex::new(PartitionState {
                        records: Vec::new(),
                        retained_from: 0,
                        expire_next_fetch: false,
                        fail_resume: false,
                        fetch_positions: Vec::new(),
                    }))
                })
                .collect(),
            batch_size,
        }
    }

    fn partition_state(&self, partition: i32) -> Result<&Arc<Mutex<PartitionState>>, SourceError> {
        self.partitions
            .get(partition as usize)
            .ok_or_else(|| SourceError::Assignment(format!("unknown partition {partition}")))
    }

    /// Append a payload to a partition's tail.
    pub fn push(&self, partition: i32, payload: impl Into<Vec<u8>>) {
        self.partitions[partition as usize]
            .lock()
            .records
            .push(payload.into());
    }

    /// Age out everything below `position`, as retention would.
    pub fn expire_before(&self, partition: i32, position: i64) {
        self.partitions[partition as usize].lock().retained_from = position;
    }

    /// Make the next fetch on this partition fail with `CursorExpired`,
    /// the way a read token times out while the position stays retained.
    pub fn expire_next_fetch(&self, partition: i32) {
        self.partitions[partition as usize].lock().expire_next_fetch = true;
    }

    /// Make every resume attempt on this partition fail with `NotRetained`.
    pub fn fail_resume(&self, partition: i32) {
        self.partitions[partition as usize].lock().fail_resume = true;
    }

    /// Positions every fetch on this partition was issued at.
    pub fn fetch_positions(&self, partition: i32) -> Vec<i64> {
        self.partitions[partition as usize].lock().fetch_positions.clone()
    }
}

#[async_trait]
impl SourceLog for InMemorySource {
    async fn list_partitions(&self) -> Result<Vec<i32>, SourceError> {
        if self.partitions.is_empty() {
            return Err(SourceError::NoPartitions {
                log: "memory".to_string(),
            });
        }
        Ok((0..self.partitions.len() as i32).collect())
    }

    async fn initial_cursor(
        &self,
        partition: i32,
        policy: StartPolicy,
    ) -> Result<PartitionCursor, SourceError> {
        let state = self.partition_state(partition)?.lock();
        let position = match policy {
            StartPolicy::Earliest => state.retained_from,
            StartPolicy::Latest => state.records.len() as i64,
        };
        Ok(PartitionCursor::new(partition, position))
    }

    async fn resume_cursor(
        &self,
        partition: i32,
        last_position: i64,
    ) -> Result<PartitionCursor, SourceError> {
        let state = self.partition_state(partition)?.lock();
        if state.fail_resume || last_position < state.retained_from {
            return Err(SourceError::NotRetained {
                partition,
                position: last_position,
            });
        }
        Ok(PartitionCursor::new(partition, last_position))
    }

    async fn create_poller(
        &self,
        partition: i32,
    ) -> Result<Box<dyn PartitionPoller>, SourceError> {
        let state = Arc::clone(self.partition_state(partition)?);
        Ok(Box::new(InMemoryPoller {
            state,
            partition,
            batch_size: self.batch_size,
        }))
    }
}

/// Poller over one in-memory partition.
pub struct InMemoryPoller {
    state: Arc<Mutex<PartitionState>>,
    partition: i32,
    batch_size: usize,
}

#[async_trait]
impl PartitionPoller for InMemoryPoller {
    async fn fetch(&mut self, cursor: &PartitionCursor) -> Result<FetchBatch, SourceError> {
        let mut state = self.state.lock();
        state.fetch_positions.push(cursor.position());

        if state.expire_next_fetch {
            state.expire_next_fetch = false;
            return Err(SourceError::CursorExpired {
                partition: self.partition,
                position: cursor.position(),
            });
        }

        if cursor.position() < state.retained_from {
            return Err(SourceError::CursorExpired {
                partition: self.partition,
                position: cursor.position(),
            });
        }

        let start = cursor.position().max(0) as usize;
        let end = (start + self.batch_size).min(state.records.len());

        let records: Vec<RawRecord> = state.records[start.min(state.records.len())..end]
            .iter()
            .enumerate()
            .map(|(i, payload)| RawRecord {
                partition: self.partition,
                sequence: (start + i) as i64,
                key: None,
                payload: payload.clone(),
                arrival_time_ms: chrono::Utc::now().timestamp_millis(),
            })
            .collect();

        let next_position = records
            .last()
            .map(|r| r.sequence + 1)
            .unwrap_or_else(|| cursor.position());

        Ok(FetchBatch {
            records,
            next_cursor: cursor.advanced_to(next_position),
        })
    }
}

/// One record accepted by the in-memory destination.
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

/// In-memory destination logs with optional failure injection.
pub struct InMemoryDestination {
    logs: DashMap<String, Vec<PublishedRecord>>,
    fail_next: AtomicU32,
}

impl InMemoryDestination {
    /// Create an empty destination set.
    pub fn new() -> Self {
        Self {
            logs: DashMap::new(),
            fail_next: AtomicU32::new(0),
        }
    }

    /// Make the next `count` publish attempts fail.
    pub fn failing_next(self, count: u32) -> Self {
        self.fail_next.store(count, Ordering::SeqCst);
        self
    }

    /// Records published to a destination log, in append order.
    pub fn published(&self, log_name: &str) -> Vec<PublishedRecord> {
        self.logs
            .get(log_name)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Total records across all destination logs.
    pub fn total_published(&self) -> usize {
        self.logs.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for InMemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DestinationLog for InMemoryDestination {
    async fn publish(
        &self,
        log_name: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<i64, PublishError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(PublishError::Delivery {
                log: log_name.to_string(),
                message: "injected failure".to_string(),
            });
        }

        let mut entries = self.logs.entry(log_name.to_string()).or_default();
        entries.push(PublishedRecord {
            key: partition_key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(entries.len() as i64 - 1)
    }
}
