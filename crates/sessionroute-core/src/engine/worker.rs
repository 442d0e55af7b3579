//! Per-partition processing loop.
//!
//! Each worker owns one partition end to end: resolve a cursor, fetch,
//! decode, enrich, classify, publish, repeat. Per-record failures are
//! logged and skipped; only an unrecoverable cursor stops the loop, and
//! then only for this partition. Shutdown is cooperative: the signal is
//! observed between batches, never mid-record, so a fetched batch is
//! always carried through to publish-or-explicit-skip.

use crate::config::StartPolicy;
use crate::decode::decode;
use crate::enrich::enrich;
use crate::error::{Error, SourceError};
use crate::health::HealthCheck;
use crate::metrics::PipelineMetrics;
use crate::model::RawRecord;
use crate::publish::Publisher;
use crate::retry::RetryConfig;
use crate::route::{RegionTag, RoutingTable};
use crate::source::{CursorTracker, PartitionPoller, SourceLog};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Loop state for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Resolving the initial cursor
    Starting,
    /// Waiting on the next fetch
    Polling,
    /// Draining a fetched batch
    Processing,
    /// Loop has exited
    Stopped,
}

/// Counters for one partition loop, reported when it stops.
#[derive(Debug, Clone, Default)]
pub struct PartitionSummary {
    pub partition: i32,
    pub fetched: u64,
    pub published: u64,
    pub skipped: u64,
}

/// Shared collaborators injected into every worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub source: Arc<dyn SourceLog>,
    pub publisher: Publisher,
    pub routes: Arc<RoutingTable>,
    pub metrics: Arc<PipelineMetrics>,
    pub health: Arc<HealthCheck>,
    pub cursors: Arc<CursorTracker>,
    pub start_policy: StartPolicy,
    pub empty_backoff: Duration,
    pub fetch_retry: RetryConfig,
}

pub(crate) struct PartitionWorker {
    partition: i32,
    poller: Box<dyn PartitionPoller>,
    ctx: WorkerContext,
    shutdown: broadcast::Receiver<()>,
    state: WorkerState,
    summary: PartitionSummary,
}

impl PartitionWorker {
    pub(crate) fn new(
        partition: i32,
        poller: Box<dyn PartitionPoller>,
        ctx: WorkerContext,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            partition,
            poller,
            ctx,
            shutdown,
            state: WorkerState::Starting,
            summary: PartitionSummary {
                partition,
                ..PartitionSummary::default()
            },
        }
    }

    /// Run the loop to completion. Returns the summary on a clean stop and
    /// the terminal error when the partition had to give up.
    pub(crate) async fn run(mut self) -> Result<PartitionSummary, Error> {
        self.ctx.metrics.partition_started();
        self.ctx.health.partition_started();

        let result = self.run_inner().await;

        self.set_state(WorkerState::Stopped);
        self.ctx.metrics.partition_stopped();
        self.ctx.health.partition_stopped();

        match result {
            Ok(()) => {
                info!(
                    partition = self.partition,
                    fetched = self.summary.fetched,
                    published = self.summary.published,
                    skipped = self.summary.skipped,
                    "Partition loop stopped"
                );
                Ok(self.summary)
            }
            Err(e) => {
                error!(
                    partition = self.partition,
                    fetched = self.summary.fetched,
                    published = self.summary.published,
                    error = %e,
                    "Partition loop terminated"
                );
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<(), Error> {
        let mut cursor = self
            .ctx
            .source
            .initial_cursor(self.partition, self.ctx.start_policy)
            .await?;
        self.ctx
            .cursors
            .record_position(self.partition, cursor.position());

        let mut fetch_failures: u32 = 0;

        loop {
            if self.shutdown_requested() {
                break;
            }
            self.set_state(WorkerState::Polling);

            let batch = match self.poller.fetch(&cursor).await {
                Ok(batch) => {
                    fetch_failures = 0;
                    batch
                }
                Err(SourceError::CursorExpired {
                    position,
                    ..
                }) => {
                    warn!(
                        partition = self.partition,
                        position = position,
                        "Cursor expired, attempting resume"
                    );
                    match self.ctx.source.resume_cursor(self.partition, position).await {
                        Ok(resumed) => {
                            self.ctx.metrics.record_cursor_resume();
                            cursor = resumed;
                            continue;
                        }
                        Err(e) => {
                            // Unrecoverable for this partition only;
                            // sibling loops keep running.
                            return Err(e.into());
                        }
                    }
                }
                Err(e) => {
                    self.ctx.metrics.record_fetch_error();
                    fetch_failures += 1;
                    let delay = self.ctx.fetch_retry.calculate_delay(fetch_failures);
                    warn!(
                        partition = self.partition,
                        failures = fetch_failures,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Fetch failed, backing off"
                    );
                    if self.sleep_or_shutdown(delay).await {
                        break;
                    }
                    continue;
                }
            };

            // The replacement cursor is always adopted, empty batch or not
            cursor = batch.next_cursor;
            self.ctx
                .cursors
                .record_position(self.partition, cursor.position());

            if batch.records.is_empty() {
                self.ctx.metrics.record_empty_fetch();
                if self.sleep_or_shutdown(self.ctx.empty_backoff).await {
                    break;
                }
                continue;
            }

            self.set_state(WorkerState::Processing);
            for record in batch.records {
                self.process_record(record).await;
            }
        }

        Ok(())
    }

    async fn process_record(&mut self, record: RawRecord) {
        self.ctx.metrics.record_fetched();
        self.summary.fetched += 1;

        let session = match decode(&record.payload) {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    partition = self.partition,
                    sequence = record.sequence,
                    error = %e,
                    "Record failed to decode, skipping"
                );
                self.ctx.metrics.record_decode_error();
                self.summary.skipped += 1;
                return;
            }
        };

        let enriched = match enrich(session, Utc::now()) {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(
                    partition = self.partition,
                    sequence = record.sequence,
                    error = %e,
                    "Record failed enrichment, skipping"
                );
                self.ctx.metrics.record_enrich_error();
                self.summary.skipped += 1;
                return;
            }
        };

        let tag = RegionTag::for_country(&enriched.session.country);
        let destination = self.ctx.routes.destination(tag).to_string();

        let started = Instant::now();
        match self
            .ctx
            .publisher
            .publish_session(&destination, &enriched)
            .await
        {
            Ok(sequence) => {
                self.ctx
                    .metrics
                    .record_published(tag == RegionTag::Usa, started.elapsed());
                self.ctx.cursors.record_published(self.partition);
                self.summary.published += 1;
                debug!(
                    partition = self.partition,
                    source_sequence = record.sequence,
                    destination = %destination,
                    destination_sequence = sequence,
                    "Record routed"
                );
            }
            Err(e) => {
                // Documented loss: the record is dropped for this run
                error!(
                    partition = self.partition,
                    sequence = record.sequence,
                    destination = %destination,
                    error = %e,
                    "Record dropped after publish retries"
                );
                self.ctx.metrics.record_publish_error();
                self.summary.skipped += 1;
            }
        }
    }

    fn set_state(&mut self, next: WorkerState) {
        if self.state != next {
            debug!(
                partition = self.partition,
                from = ?self.state,
                to = ?next,
                "Worker state change"
            );
            self.state = next;
        }
    }

    fn shutdown_requested(&mut self) -> bool {
        !matches!(
            self.shutdown.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        )
    }

    /// Sleep, waking early on shutdown. Returns true when shutdown fired.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.shutdown.recv() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDestination, InMemorySource};
    use std::collections::HashMap;

    fn routes() -> Arc<RoutingTable> {
        let mut map = HashMap::new();
        map.insert("USA".to_string(), "sessions-usa".to_string());
        map.insert("International".to_string(), "sessions-intl".to_string());
        Arc::new(RoutingTable::from_map(&map).unwrap())
    }

    fn context(
        source: Arc<InMemorySource>,
        destination: Arc<InMemoryDestination>,
        start_policy: StartPolicy,
    ) -> WorkerContext {
        WorkerContext {
            source,
            publisher: Publisher::new(
                destination,
                RetryConfig::new(Duration::from_millis(1), Duration::from_millis(2), 3)
                    .without_jitter(),
            ),
            routes: routes(),
            metrics: Arc::new(PipelineMetrics::new()),
            health: Arc::new(HealthCheck::new()),
            cursors: Arc::new(CursorTracker::new()),
            start_policy,
            empty_backoff: Duration::from_millis(5),
            fetch_retry: RetryConfig::for_fetch().without_jitter(),
        }
    }

    fn payload(session_id: &str, country: &str) -> Vec<u8> {
        format!(
            r#"{{"session_id":"{session_id}","customer_number":1,"city":"X","country":"{country}","credit_limit":10,"browse_history":[]}}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_worker_drains_backlog_and_stops_on_shutdown() {
        let source = Arc::new(InMemorySource::new(1, 10));
        source.push(0, payload("s1", "USA"));
        source.push(0, payload("s2", "France"));

        let destination = Arc::new(InMemoryDestination::new());
        let ctx = context(source.clone(), destination.clone(), StartPolicy::Earliest);
        let metrics = ctx.metrics.clone();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let poller = source.create_poller(0).await.unwrap();
        let worker = PartitionWorker::new(0, poller, ctx, shutdown_rx);
        let handle = tokio::spawn(worker.run());

        // Wait for the backlog to drain, then stop
        for _ in 0..200 {
            if destination.total_published() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(()).unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.published, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(destination.published("sessions-usa").len(), 1);
        assert_eq!(destination.published("sessions-intl").len(), 1);
        assert_eq!(metrics.partitions_active(), 0);
    }

    #[tokio::test]
    async fn test_worker_skips_malformed_record_and_continues() {
        let source = Arc::new(InMemorySource::new(1, 10));
        source.push(0, b"{not json".to_vec());
        source.push(0, payload("s2", "USA"));

        let destination = Arc::new(InMemoryDestination::new());
        let ctx = context(source.clone(), destination.clone(), StartPolicy::Earliest);
        let metrics = ctx.metrics.clone();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let poller = source.create_poller(0).await.unwrap();
        let handle = tokio::spawn(PartitionWorker::new(0, poller, ctx, shutdown_rx).run());

        for _ in 0..200 {
            if destination.total_published() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(()).unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.published, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(metrics.decode_errors_total(), 1);
    }

    #[tokio::test]
    async fn test_worker_polls_again_after_empty_batch() {
        let source = Arc::new(InMemorySource::new(1, 10));
        let destination = Arc::new(InMemoryDestination::new());
        let ctx = context(source.clone(), destination.clone(), StartPolicy::Latest);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let poller = source.create_poller(0).await.unwrap();
        let handle = tokio::spawn(PartitionWorker::new(0, poller, ctx, shutdown_rx).run());

        // Let it see a few empty batches, then append a record
        tokio::time::sleep(Duration::from_millis(30)).await;
        source.push(0, payload("late", "USA"));

        for _ in 0..200 {
            if destination.total_published() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(()).unwrap();
        let summary = handle.await.unwrap().unwrap();

        assert_eq!(summary.published, 1);
        // Empty fetches re-used the adopted cursor position until data arrived
        let positions = source.fetch_positions(0);
        assert!(positions.len() >= 2);
        assert!(positions.windows(2).all(|w| w[1] >= w[0]));
    }

    #[tokio::test]
    async fn test_worker_resumes_after_cursor_expiry() {
        let source = Arc::new(InMemorySource::new(1, 10));
        source.push(0, payload("s0", "USA"));
        source.push(0, payload("s1", "France"));
        // First fetch fails like a timed-out read token; the position is
        // still retained, so one resume recovers the loop
        source.expire_next_fetch(0);

        let destination = Arc::new(InMemoryDestination::new());
        let ctx = context(source.clone(), destination.clone(), StartPolicy::Earliest);
        let metrics = ctx.metrics.clone();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let poller = source.create_poller(0).await.unwrap();
        let handle = tokio::spawn(PartitionWorker::new(0, poller, ctx, shutdown_rx).run());

        for _ in 0..200 {
            if destination.total_published() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(()).unwrap();
        let summary = handle.await.unwrap().unwrap();

        assert_eq!(summary.published, 2);
        assert_eq!(metrics.cursor_resumes_total(), 1);
    }

    #[tokio::test]
    async fn test_worker_stops_partition_when_resume_impossible() {
        let source = Arc::new(InMemorySource::new(1, 10));
        source.push(0, payload("s0", "USA"));
        source.expire_next_fetch(0);
        source.fail_resume(0);

        let destination = Arc::new(InMemoryDestination::new());
        let ctx = context(source.clone(), destination.clone(), StartPolicy::Earliest);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let poller = source.create_poller(0).await.unwrap();

        let err = PartitionWorker::new(0, poller, ctx, shutdown_rx)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Source(SourceError::NotRetained { partition: 0, .. })
        ));
    }
}
