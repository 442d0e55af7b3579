//! Kafka-backed source log.
//!
//! Partitions are enumerated once at startup and each poller owns a
//! dedicated consumer explicitly assigned to its partition at the cursor
//! position. No consumer-group rebalancing is involved; the cursor is the
//! only read state, and it lives in memory for the process's runtime.

use super::{FetchBatch, PartitionCursor, PartitionPoller, SourceLog};
use crate::config::{SourceConfig, StartPolicy};
use crate::error::SourceError;
use crate::model::RawRecord;
use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError as RdKafkaError;
use rdkafka::message::Message;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Kafka source log client, built once at startup.
pub struct KafkaSourceLog {
    client_config: ClientConfig,
    metadata_consumer: StreamConsumer,
    topic: String,
    batch_size: usize,
    fetch_timeout: Duration,
}

impl KafkaSourceLog {
    /// Create the source client and its metadata connection.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", config.bootstrap_servers.join(","))
            .set("group.id", &config.group_id)
            // Cursors are the only read state; the broker never stores them
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            // Surface out-of-range positions as errors instead of silently
            // resetting; cursor recovery is handled by the partition loop
            .set("auto.offset.reset", "error")
            .set(
                "session.timeout.ms",
                config.session_timeout_ms.to_string(),
            );

        if let Some(ref protocol) = config.security.protocol {
            client_config.set("security.protocol", protocol);
        }
        if let Some(ref mechanism) = config.security.sasl_mechanism {
            client_config.set("sasl.mechanism", mechanism);
        }
        if let Some(ref username) = config.security.sasl_username {
            client_config.set("sasl.username", username);
        }
        if let Some(ref password) = config.security.sasl_password {
            client_config.set("sasl.password", password);
        }
        if let Some(ref path) = config.security.ssl_ca_location {
            client_config.set("ssl.ca.location", path.to_string_lossy().as_ref());
        }

        let metadata_consumer: StreamConsumer =
            client_config
                .create()
                .map_err(|e| SourceError::ConnectionFailed {
                    broker: config.bootstrap_servers.join(","),
                    message: e.to_string(),
                })?;

        Ok(Self {
            client_config,
            metadata_consumer,
            topic: config.log_name.clone(),
            batch_size: config.batch_size,
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
        })
    }

    fn watermarks(&self, partition: i32) -> Result<(i64, i64), SourceError> {
        self.metadata_consumer
            .fetch_watermarks(&self.topic, partition, METADATA_TIMEOUT)
            .map_err(|e| SourceError::Watermarks {
                partition,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl SourceLog for KafkaSourceLog {
    async fn list_partitions(&self) -> Result<Vec<i32>, SourceError> {
        let metadata = self
            .metadata_consumer
            .fetch_metadata(Some(&self.topic), METADATA_TIMEOUT)
            .map_err(|e| SourceError::Metadata(e.to_string()))?;

        let topic = metadata
            .topics()
            .iter()
            .find(|t| t.name() == self.topic)
            .ok_or_else(|| SourceError::LogNotFound {
                log: self.topic.clone(),
                message: "not present in broker metadata".to_string(),
            })?;

        if let Some(err) = topic.error() {
            return Err(SourceError::LogNotFound {
                log: self.topic.clone(),
                message: format!("{err:?}"),
            });
        }

        let partitions: Vec<i32> = topic.partitions().iter().map(|p| p.id()).collect();
        if partitions.is_empty() {
            return Err(SourceError::NoPartitions {
                log: self.topic.clone(),
            });
        }

        info!(
            log = %self.topic,
            partitions = partitions.len(),
            "Source partitions enumerated"
        );

        Ok(partitions)
    }

    async fn initial_cursor(
        &self,
        partition: i32,
        policy: StartPolicy,
    ) -> Result<PartitionCursor, SourceError> {
        let (low, high) = self.watermarks(partition)?;
        let position = match policy {
            StartPolicy::Earliest => low,
            StartPolicy::Latest => high,
        };

        debug!(
            partition = partition,
            position = position,
            policy = ?policy,
            "Initial cursor resolved"
        );

        Ok(PartitionCursor::new(partition, position))
    }

    async fn resume_cursor(
        &self,
        partition: i32,
        last_position: i64,
    ) -> Result<PartitionCursor, SourceError> {
        let (low, _high) = self.watermarks(partition)?;
        if last_position < low {
            return Err(SourceError::NotRetained {
                partition,
                position: last_position,
            });
        }

        debug!(
            partition = partition,
            position = last_position,
            "Cursor resumed at last known position"
        );

        Ok(PartitionCursor::new(partition, last_position))
    }

    async fn create_poller(
        &self,
        partition: i32,
    ) -> Result<Box<dyn PartitionPoller>, SourceError> {
        let consumer: StreamConsumer =
            self.client_config
                .create()
                .map_err(|e| SourceError::ConnectionFailed {
                    broker: "source".to_string(),
                    message: e.to_string(),
                })?;

        Ok(Box::new(KafkaPartitionPoller {
            consumer,
            topic: self.topic.clone(),
            partition,
            batch_size: self.batch_size,
            fetch_timeout: self.fetch_timeout,
            assigned: None,
        }))
    }
}

/// Poller for one Kafka partition, holding its own assigned consumer.
pub struct KafkaPartitionPoller {
    consumer: StreamConsumer,
    topic: String,
    partition: i32,
    batch_size: usize,
    fetch_timeout: Duration,
    /// Next position the consumer is currently assigned at. A cursor that
    /// disagrees (first fetch, or a resume) forces a re-assign.
    assigned: Option<i64>,
}

impl KafkaPartitionPoller {
    fn assign_at(&mut self, position: i64) -> Result<(), SourceError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(position))
            .map_err(|e| SourceError::Assignment(e.to_string()))?;

        self.consumer
            .assign(&tpl)
            .map_err(|e| SourceError::Assignment(e.to_string()))?;

        debug!(
            partition = self.partition,
            position = position,
            "Partition consumer assigned"
        );

        self.assigned = Some(position);
        Ok(())
    }
}

#[async_trait]
impl PartitionPoller for KafkaPartitionPoller {
    async fn fetch(&mut self, cursor: &PartitionCursor) -> Result<FetchBatch, SourceError> {
        use futures::StreamExt;

        if self.assigned != Some(cursor.position()) {
            self.assign_at(cursor.position())?;
        }

        let mut records = Vec::with_capacity(self.batch_size);
        let deadline = tokio::time::Instant::now() + self.fetch_timeout;

        {
            let stream = self.consumer.stream();
            tokio::pin!(stream);

            while records.len() < self.batch_size {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    break;
                }

                match tokio::time::timeout(remaining, stream.next()).await {
                    Ok(Some(Ok(msg))) => {
                        records.push(RawRecord {
                            partition: msg.partition(),
                            sequence: msg.offset(),
                            key: msg.key().map(|k| k.to_vec()),
                            payload: msg.payload().map(|v| v.to_vec()).unwrap_or_default(),
                            arrival_time_ms: msg.timestamp().to_millis().unwrap_or(0),
                        });
                    }
                    Ok(Some(Err(e))) => {
                        return Err(map_consume_error(self.partition, cursor.position(), e));
                    }
                    // Stream end or read timeout: both are an empty tail
                    Ok(None) | Err(_) => break,
                }
            }
        }

        let next_position = records
            .last()
            .map(|r| r.sequence + 1)
            .unwrap_or_else(|| cursor.position());
        self.assigned = Some(next_position);

        Ok(FetchBatch {
            records,
            next_cursor: cursor.advanced_to(next_position),
        })
    }
}

/// Map a consumption error; out-of-range positions become `CursorExpired`
/// so the partition loop can attempt a resume.
fn map_consume_error(partition: i32, position: i64, error: RdKafkaError) -> SourceError {
    match error {
        RdKafkaError::MessageConsumption(code) if code == RDKafkaErrorCode::OffsetOutOfRange => {
            SourceError::CursorExpired {
                partition,
                position,
            }
        }
        other => SourceError::Fetch {
            partition,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_maps_to_cursor_expired() {
        let err = map_consume_error(
            2,
            117,
            RdKafkaError::MessageConsumption(RDKafkaErrorCode::OffsetOutOfRange),
        );
        assert!(matches!(
            err,
            SourceError::CursorExpired {
                partition: 2,
                position: 117
            }
        ));
    }

    #[test]
    fn test_other_errors_map_to_fetch() {
        let err = map_consume_error(
            0,
            0,
            RdKafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure),
        );
        assert!(matches!(err, SourceError::Fetch { partition: 0, .. }));
    }
}
