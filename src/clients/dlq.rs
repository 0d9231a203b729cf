use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::models::dead_letter::DeadLetter;
use crate::models::envelope::Envelope;
use crate::models::record::SourceRecord;
use crate::retry::RetryPolicy;

/// Re-emits an unprocessable or exhausted record to the quarantine topic.
///
/// Injected into the consumption loop as a capability so tests can observe
/// quarantines without a broker.
#[async_trait]
pub trait QuarantineSink: Send + Sync {
    async fn quarantine(
        &self,
        record: &SourceRecord,
        message_id: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), RelayError>;

    /// Bounded wait for pending quarantine writes during shutdown.
    async fn flush(&self, _timeout: Duration) {}
}

pub struct DeadLetterPublisher {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
    retry: RetryPolicy,
}

impl DeadLetterPublisher {
    pub fn connect(config: &Config) -> Result<Self, RelayError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.send.max.retries", "10")
            .set("linger.ms", "0")
            .create()?;

        info!(topic = %config.kafka_dlq_topic, "dead-letter producer created");

        Ok(Self {
            producer,
            topic: config.kafka_dlq_topic.clone(),
            send_timeout: Duration::from_millis(config.dlq_publish_timeout_ms),
            retry: config.dlq_retry_policy(),
        })
    }

    /// Source headers minus any prior origin marker, plus a fresh one
    /// naming the topic this record actually failed on.
    fn build_headers(record: &SourceRecord) -> OwnedHeaders {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &record.headers {
            if key != SourceRecord::ORIGIN_TOPIC_HEADER {
                headers = headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value),
                });
            }
        }
        headers.insert(Header {
            key: SourceRecord::ORIGIN_TOPIC_HEADER,
            value: Some(record.topic.as_bytes()),
        })
    }

    async fn publish_once(
        &self,
        key: &str,
        payload: &str,
        headers: OwnedHeaders,
    ) -> Result<(), RelayError> {
        let outgoing = FutureRecord::to(&self.topic)
            .key(key)
            .payload(payload)
            .headers(headers);

        self.producer
            .send(outgoing, Timeout::After(self.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(err, _)| RelayError::Transport(err))
    }
}

#[async_trait]
impl QuarantineSink for DeadLetterPublisher {
    async fn quarantine(
        &self,
        record: &SourceRecord,
        message_id: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), RelayError> {
        let dead = DeadLetter::new(record, error, attempts);
        let envelope = Envelope::new(message_id, dead);
        let payload = serde_json::to_string(&envelope)?;
        let key = record.key.as_deref().unwrap_or(message_id);

        // The publish itself gets a small bounded retry; past that the
        // caller commits anyway and the loss is logged, so a degraded
        // quarantine topic cannot wedge the partition.
        let mut attempt: u32 = 0;
        loop {
            match self
                .publish_once(key, &payload, Self::build_headers(record))
                .await
            {
                Ok(()) => {
                    warn!(
                        message_id,
                        dlq_topic = %self.topic,
                        source_topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        attempts,
                        "record quarantined to dead-letter topic"
                    );
                    return Ok(());
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > self.retry.max_attempts {
                        return Err(err);
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        message_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "dead-letter publish failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn flush(&self, timeout: Duration) {
        let producer = self.producer.clone();
        let result = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "dead-letter producer flush failed"),
            Err(err) => warn!(error = %err, "dead-letter flush task failed"),
        }
    }
}
