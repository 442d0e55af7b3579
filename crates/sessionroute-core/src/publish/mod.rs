//! Fan-out publishing to destination logs.
//!
//! `DestinationLog` is the transport seam; `Publisher` wraps it with the
//! wire serialization and the bounded retry policy. Exactly one
//! destination is written per input record.

mod kafka;

pub use kafka::KafkaPublisher;

use crate::error::PublishError;
use crate::model::EnrichedSession;
use crate::retry::RetryConfig;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// A destination partitioned log accepting durable appends.
#[async_trait]
pub trait DestinationLog: Send + Sync {
    /// Append one payload to the destination log's tail, keyed so that
    /// repeated keys land on the same destination partition. Returns the
    /// acknowledged sequence position.
    async fn publish(
        &self,
        log_name: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<i64, PublishError>;
}

/// Serializes enriched sessions and publishes them with bounded retries.
///
/// After retries are exhausted the error is surfaced to the caller and the
/// record is dropped from this run; the loss is logged, never hidden.
#[derive(Clone)]
pub struct Publisher {
    destination: Arc<dyn DestinationLog>,
    retry: RetryConfig,
}

impl Publisher {
    /// Create a publisher over a destination transport.
    pub fn new(destination: Arc<dyn DestinationLog>, retry: RetryConfig) -> Self {
        Self { destination, retry }
    }

    /// Publish one enriched session to `log_name`, keyed by session id.
    pub async fn publish_session(
        &self,
        log_name: &str,
        session: &EnrichedSession,
    ) -> Result<i64, PublishError> {
        let payload =
            serde_json::to_vec(session).map_err(|e| PublishError::Serialize(e.to_string()))?;
        let key = session.partition_key();

        let mut attempt = 0;
        loop {
            match self.destination.publish(log_name, key, &payload).await {
                Ok(sequence) => return Ok(sequence),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_retries {
                        return Err(PublishError::RetriesExhausted {
                            log: log_name.to_string(),
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }

                    let delay = self.retry.calculate_delay(attempt);
                    warn!(
                        log = %log_name,
                        key = %key,
                        attempt = attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Publish failed, retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
