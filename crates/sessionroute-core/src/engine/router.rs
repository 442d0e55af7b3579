//! Routing engine orchestration.
//!
//! Validates configuration once (a missing route is fatal before any loop
//! starts), enumerates the source partitions, and runs one independent
//! `PartitionWorker` per partition. Transport clients are constructed once
//! here and injected into the loops.

use super::worker::{PartitionWorker, WorkerContext};
use crate::config::Config;
use crate::health::HealthCheck;
use crate::metrics::PipelineMetrics;
use crate::publish::{DestinationLog, KafkaPublisher, Publisher};
use crate::retry::RetryConfig;
use crate::route::RoutingTable;
use crate::source::{CursorTracker, KafkaSourceLog, SourceLog};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info};

/// The pipeline orchestrator.
pub struct RouterEngine {
    config: Config,
    source: Arc<dyn SourceLog>,
    destination: Arc<dyn DestinationLog>,
    routes: Arc<RoutingTable>,
    metrics: Arc<PipelineMetrics>,
    health: Arc<HealthCheck>,
    cursors: Arc<CursorTracker>,
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for RouterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEngine")
            .field("config", &self.config)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl RouterEngine {
    /// Create an engine over Kafka transports.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let source = Arc::new(KafkaSourceLog::new(&config.source)?);

        let mut publisher_config = config.publisher.clone();
        publisher_config.bootstrap_servers = config.publisher_servers();
        let destination = Arc::new(KafkaPublisher::new(&publisher_config)?);

        Self::with_transports(config, source, destination)
    }

    /// Create an engine over injected transports. The routing table is
    /// built and validated here, before any partition loop exists.
    pub fn with_transports(
        config: Config,
        source: Arc<dyn SourceLog>,
        destination: Arc<dyn DestinationLog>,
    ) -> Result<Self> {
        config.validate()?;
        let routes = Arc::new(RoutingTable::from_map(&config.routing)?);

        let health = Arc::new(HealthCheck::new());
        health.register_component("source");
        health.register_component("publisher");

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            source,
            destination,
            routes,
            metrics: Arc::new(PipelineMetrics::new()),
            health,
            cursors: Arc::new(CursorTracker::new()),
            shutdown_tx,
        })
    }

    /// Run all partition loops until shutdown or until every loop has
    /// terminated. Startup faults (unknown log, zero partitions) abort
    /// before any loop starts; a single partition failing later never
    /// stops its siblings.
    pub async fn run(&self) -> Result<()> {
        let partitions = match self.source.list_partitions().await {
            Ok(partitions) => {
                self.health.mark_healthy("source");
                partitions
            }
            Err(e) => {
                self.health
                    .mark_unhealthy("source", &format!("Enumeration failed: {e}"));
                return Err(e.into());
            }
        };

        info!(
            log = %self.config.source.log_name,
            partitions = partitions.len(),
            destinations = ?self.routes.destinations(),
            start_policy = ?self.config.source.start_policy,
            "Starting partition loops"
        );
        self.health.mark_healthy("publisher");

        let publisher = Publisher::new(
            Arc::clone(&self.destination),
            RetryConfig::for_publish(
                self.config.publisher.max_retries,
                Duration::from_millis(self.config.publisher.retry_backoff_ms),
            ),
        );

        let ctx = WorkerContext {
            source: Arc::clone(&self.source),
            publisher,
            routes: Arc::clone(&self.routes),
            metrics: Arc::clone(&self.metrics),
            health: Arc::clone(&self.health),
            cursors: Arc::clone(&self.cursors),
            start_policy: self.config.source.start_policy,
            empty_backoff: Duration::from_millis(self.config.source.empty_poll_backoff_ms),
            fetch_retry: RetryConfig::for_fetch(),
        };

        let mut workers = JoinSet::new();
        for partition in partitions {
            let poller = match self.source.create_poller(partition).await {
                Ok(poller) => poller,
                Err(e) => {
                    // This partition never starts; siblings are unaffected
                    error!(
                        partition = partition,
                        error = %e,
                        "Failed to create partition poller"
                    );
                    continue;
                }
            };

            let worker = PartitionWorker::new(
                partition,
                poller,
                ctx.clone(),
                self.shutdown_tx.subscribe(),
            );
            workers.spawn(worker.run());
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(summary)) => {
                    info!(
                        partition = summary.partition,
                        fetched = summary.fetched,
                        published = summary.published,
                        skipped = summary.skipped,
                        "Partition loop finished"
                    );
                }
                Ok(Err(e)) => {
                    // Already logged by the worker; reflect it in health
                    self.health
                        .mark_degraded("source", &format!("Partition loop terminated: {e}"));
                }
                Err(e) => {
                    error!(error = %e, "Partition task panicked");
                    self.health
                        .mark_degraded("source", "Partition task panicked");
                }
            }
        }

        info!(
            published = self.cursors.total_published(),
            final_positions = ?self.cursors.snapshot(),
            "Routing engine stopped"
        );

        Ok(())
    }

    /// Get the shutdown signal sender.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Get metrics.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get health check.
    pub fn health(&self) -> Arc<HealthCheck> {
        Arc::clone(&self.health)
    }

    /// Get the cursor tracker.
    pub fn cursors(&self) -> Arc<CursorTracker> {
        Arc::clone(&self.cursors)
    }

    /// Get the validated routing table.
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }
}
