use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::dlq::QuarantineSink;
use crate::clients::kafka::KafkaSource;
use crate::dispatch::SenderRegistry;
use crate::error::RelayError;
use crate::idempotency::ProcessedStore;
use crate::models::record::SourceRecord;
use crate::parser;
use crate::retry::{self, RetryOutcome, RetryPolicy};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Terminal outcome of one record. Every variant except `Cancelled` means
/// the offset is safe to commit.
#[derive(Debug)]
pub enum RecordOutcome {
    Delivered { message_id: String },
    Duplicate { message_id: String },
    Quarantined { message_id: String, attempts: u32 },
    Cancelled,
}

/// Per-record orchestration: parse, duplicate check, channel resolution,
/// retried delivery, marker write, quarantine. Holds no broker state, so
/// tests drive it directly with fake senders and sinks.
pub struct RecordProcessor {
    registry: SenderRegistry,
    store: Arc<dyn ProcessedStore>,
    quarantine: Arc<dyn QuarantineSink>,
    retry: RetryPolicy,
}

impl RecordProcessor {
    pub fn new(
        registry: SenderRegistry,
        store: Arc<dyn ProcessedStore>,
        quarantine: Arc<dyn QuarantineSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            quarantine,
            retry,
        }
    }

    /// Resolves one record to a terminal outcome. Transport-class failures
    /// (store I/O here; fetch and commit live in the loop) return `Err` so
    /// the caller skips the commit and lets the broker re-deliver.
    pub async fn process(
        &self,
        record: &SourceRecord,
        cancel: &CancellationToken,
    ) -> Result<RecordOutcome, RelayError> {
        let parsed = match parser::parse(&record.payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %err,
                    "unparseable payload, quarantining"
                );
                let message_id = crate::models::envelope::content_hash(&record.payload);
                self.quarantine_record(record, &message_id, &err.to_string(), 0)
                    .await;
                return Ok(RecordOutcome::Quarantined {
                    message_id,
                    attempts: 0,
                });
            }
        };

        let message_id = parsed.message_id;

        if self.store.exists(&message_id).await? {
            info!(message_id = %message_id, "duplicate message skipped");
            return Ok(RecordOutcome::Duplicate { message_id });
        }

        let sender = match self.registry.resolve(parsed.request.channel) {
            Ok(sender) => sender.clone(),
            Err(err) => {
                warn!(message_id = %message_id, error = %err, "unresolvable channel, quarantining");
                self.quarantine_record(record, &message_id, &err.to_string(), 0)
                    .await;
                return Ok(RecordOutcome::Quarantined {
                    message_id,
                    attempts: 0,
                });
            }
        };

        let request = parsed.request.clone();
        let outcome = retry::invoke(&self.retry, cancel, || sender.send(&request, cancel)).await;

        match outcome {
            RetryOutcome::Success => {
                self.store.mark_processed(&message_id).await?;
                info!(
                    message_id = %message_id,
                    channel = %parsed.request.channel,
                    recipient = %parsed.request.recipient,
                    "notification delivered"
                );
                Ok(RecordOutcome::Delivered { message_id })
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                warn!(
                    message_id = %message_id,
                    attempts,
                    error = %last_error,
                    "retries exhausted, quarantining"
                );
                self.quarantine_record(record, &message_id, &last_error.to_string(), attempts)
                    .await;
                Ok(RecordOutcome::Quarantined {
                    message_id,
                    attempts,
                })
            }
            RetryOutcome::Cancelled => Ok(RecordOutcome::Cancelled),
        }
    }

    /// Quarantine publish failures have no further fallback: the loss is
    /// logged for the record and the pipeline moves on.
    async fn quarantine_record(
        &self,
        record: &SourceRecord,
        message_id: &str,
        reason: &str,
        attempts: u32,
    ) {
        if let Err(err) = self
            .quarantine
            .quarantine(record, message_id, reason, attempts)
            .await
        {
            error!(
                message_id,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %err,
                "dead-letter publish failed, record lost from quarantine"
            );
        }
    }
}

/// The consumption loop: subscribe, poll, process, commit, repeat, with
/// manual commits only after a terminal outcome. One loop instance owns the
/// broker session exclusively.
pub struct RelayWorker {
    source: KafkaSource,
    processor: RecordProcessor,
    quarantine: Arc<dyn QuarantineSink>,
    cancel: CancellationToken,
    transport_backoff: Duration,
}

impl RelayWorker {
    pub fn new(
        source: KafkaSource,
        processor: RecordProcessor,
        quarantine: Arc<dyn QuarantineSink>,
        cancel: CancellationToken,
        transport_backoff: Duration,
    ) -> Self {
        Self {
            source,
            processor,
            quarantine,
            cancel,
            transport_backoff,
        }
    }

    pub async fn run(self) -> Result<(), RelayError> {
        // Subscription failure is fatal: the loop exits without processing.
        self.source.subscribe()?;
        info!("consumer loop started");

        loop {
            let record = tokio::select! {
                _ = self.cancel.cancelled() => break,
                fetched = self.source.next_record() => match fetched {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(error = %err, "transport error on fetch, backing off");
                        self.transport_pause().await;
                        continue;
                    }
                },
            };

            match self.processor.process(&record, &self.cancel).await {
                Ok(RecordOutcome::Cancelled) => break,
                Ok(outcome) => {
                    if let Err(err) = self.source.commit(&record) {
                        // The commit did not advance; the record will be
                        // re-delivered and the idempotency store absorbs it.
                        warn!(
                            topic = %record.topic,
                            partition = record.partition,
                            offset = record.offset,
                            error = %err,
                            "offset commit failed"
                        );
                        self.transport_pause().await;
                    } else if let RecordOutcome::Quarantined { message_id, attempts } = &outcome {
                        info!(message_id = %message_id, attempts = *attempts, "offset committed after quarantine");
                    }
                }
                Err(err) => {
                    warn!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        error = %err,
                        "transient failure, record will be re-delivered"
                    );
                    self.transport_pause().await;
                }
            }
        }

        self.source.close();
        self.quarantine.flush(FLUSH_TIMEOUT).await;
        info!("consumer loop stopped");
        Ok(())
    }

    async fn transport_pause(&self) {
        tokio::select! {
            _ = sleep(self.transport_backoff) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}
