use rdkafka::ClientConfig;
use rdkafka::Offset;
use rdkafka::TopicPartitionList;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use tracing::info;

use crate::config::Config;
use crate::error::RelayError;
use crate::models::record::SourceRecord;

/// The broker session owned by one consumption loop: read cursor plus
/// manual offset commits. Never shared across loops.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSource {
    pub fn connect(config: &Config) -> Result<Self, RelayError> {
        // Commits are manual: the offset moves only after a record reaches
        // a terminal outcome (delivered, duplicate, or dead-lettered).
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("group.id", &config.kafka_group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.kafka_auto_offset_reset)
            .set("session.timeout.ms", config.kafka_session_timeout_ms.to_string())
            .set("max.poll.interval.ms", config.kafka_max_poll_interval_ms.to_string())
            .set("reconnect.backoff.ms", config.kafka_reconnect_backoff_ms.to_string())
            .set("reconnect.backoff.max.ms", config.kafka_reconnect_backoff_max_ms.to_string())
            .create()?;

        info!(brokers = %config.kafka_brokers, group = %config.kafka_group_id, "Kafka consumer created");

        Ok(Self {
            consumer,
            topic: config.kafka_topic.clone(),
        })
    }

    pub fn subscribe(&self) -> Result<(), RelayError> {
        self.consumer.subscribe(&[self.topic.as_str()])?;
        info!(topic = %self.topic, "subscribed");
        Ok(())
    }

    /// Blocking fetch of the next record. Suspends until a record arrives
    /// or the broker reports a transport error; cancellation is handled by
    /// the caller racing this future against the shutdown token.
    pub async fn next_record(&self) -> Result<SourceRecord, RelayError> {
        let message = self.consumer.recv().await?;

        let payload = message
            .payload()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();

        let key = message
            .key()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned());

        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|header| {
                        (
                            header.key.to_string(),
                            header.value.map(<[u8]>::to_vec).unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SourceRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key,
            payload,
            headers,
        })
    }

    /// Durably records progress past `record` so redelivery resumes after
    /// it. Only called once the record has a terminal outcome.
    pub fn commit(&self, record: &SourceRecord) -> Result<(), RelayError> {
        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(
            &record.topic,
            record.partition,
            Offset::Offset(record.offset + 1),
        )?;
        self.consumer.commit(&assignment, CommitMode::Sync)?;
        Ok(())
    }

    /// Surrenders group membership. Dropping the consumer closes the
    /// underlying session.
    pub fn close(&self) {
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "unsubscribed");
    }
}
