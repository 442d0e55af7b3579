//! Kafka-backed destination logs.
//!
//! One producer serves every destination; the topic is chosen per record
//! by the router. Built once at startup and injected into the loops.

use super::DestinationLog;
use crate::config::PublisherConfig;
use crate::error::PublishError;
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::debug;

/// Kafka producer publishing enriched sessions to destination topics.
pub struct KafkaPublisher {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl KafkaPublisher {
    /// Create the producer.
    pub fn new(config: &PublisherConfig) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers.join(","))
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .set("compression.type", &config.compression)
            // Durable append: wait for all in-sync replicas
            .set("acks", "all")
            .create()
            .map_err(|e| PublishError::Delivery {
                log: "destination".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            producer,
            delivery_timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }
}

#[async_trait]
impl DestinationLog for KafkaPublisher {
    async fn publish(
        &self,
        log_name: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<i64, PublishError> {
        let record = FutureRecord::to(log_name).key(partition_key).payload(payload);

        let (partition, sequence) = self
            .producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
            .map_err(|(err, _)| PublishError::Delivery {
                log: log_name.to_string(),
                message: err.to_string(),
            })?;

        debug!(
            log = %log_name,
            key = %partition_key,
            partition = partition,
            sequence = sequence,
            "Record published"
        );

        Ok(sequence)
    }
}
