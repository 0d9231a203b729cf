use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use notification_relay::clients::dlq::QuarantineSink;
use notification_relay::dispatch::{ChannelSender, SenderRegistry};
use notification_relay::error::RelayError;
use notification_relay::idempotency::{InMemoryProcessedStore, ProcessedStore};
use notification_relay::models::dead_letter::DeadLetter;
use notification_relay::models::envelope::{Channel, Envelope, NotificationRequest};
use notification_relay::models::record::SourceRecord;
use notification_relay::retry::RetryPolicy;
use notification_relay::worker::{RecordOutcome, RecordProcessor};
use tokio_util::sync::CancellationToken;

const TYPED_ENVELOPE: &str = r#"{"Id":"m1","Content":{"Recipient":"a@x.com","Subject":"Hi","Message":"Hello","Channel":"Email"},"Timestamp":"2024-01-01T00:00:00Z"}"#;

/// Sender that fails transiently a configured number of times, then succeeds.
struct FlakySender {
    fail_first: u32,
    calls: AtomicU32,
}

impl FlakySender {
    fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for FlakySender {
    async fn send(
        &self,
        _request: &NotificationRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), RelayError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            Err(RelayError::Send("451 temporary failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

#[derive(Debug, Clone)]
struct CapturedQuarantine {
    message_id: String,
    original: String,
    error: String,
    attempts: u32,
}

/// Quarantine sink that records instead of publishing.
#[derive(Default)]
struct RecordingQuarantine {
    letters: Mutex<Vec<CapturedQuarantine>>,
    fail: bool,
}

impl RecordingQuarantine {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            letters: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn letters(&self) -> Vec<CapturedQuarantine> {
        self.letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuarantineSink for RecordingQuarantine {
    async fn quarantine(
        &self,
        record: &SourceRecord,
        message_id: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), RelayError> {
        self.letters.lock().unwrap().push(CapturedQuarantine {
            message_id: message_id.to_string(),
            original: record.payload.clone(),
            error: error.to_string(),
            attempts,
        });
        if self.fail {
            Err(RelayError::Send("dlq unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

fn record_with(payload: &str) -> SourceRecord {
    SourceRecord {
        topic: "email".to_string(),
        partition: 0,
        offset: 42,
        key: None,
        payload: payload.to_string(),
        headers: vec![("content-type".to_string(), b"application/json".to_vec())],
    }
}

fn processor(
    sender: Arc<dyn ChannelSender>,
    store: Arc<dyn ProcessedStore>,
    quarantine: Arc<dyn QuarantineSink>,
    max_attempts: u32,
) -> RecordProcessor {
    let registry = SenderRegistry::new().register(Channel::Email, sender);
    RecordProcessor::new(registry, store, quarantine, RetryPolicy::new(max_attempts, &[1]))
}

/// Test: First delivery succeeds, the id is marked, and no dead-letter is
/// emitted
#[tokio::test]
async fn test_successful_delivery_marks_message() {
    let sender = FlakySender::new(0);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::new();
    let processor = processor(sender.clone(), store.clone(), quarantine.clone(), 3);
    let cancel = CancellationToken::new();

    let outcome = processor
        .process(&record_with(TYPED_ENVELOPE), &cancel)
        .await
        .unwrap();

    match outcome {
        RecordOutcome::Delivered { message_id } => assert_eq!(message_id, "m1"),
        other => panic!("expected Delivered, got {:?}", other),
    }
    assert_eq!(sender.calls(), 1);
    assert!(store.exists("m1").await.unwrap());
    assert!(quarantine.letters().is_empty());
}

/// Test: Redelivering the same message id skips the sender but still ends
/// in a committable outcome
#[tokio::test]
async fn test_duplicate_delivery_sends_exactly_once() {
    let sender = FlakySender::new(0);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::new();
    let processor = processor(sender.clone(), store.clone(), quarantine.clone(), 3);
    let cancel = CancellationToken::new();
    let record = record_with(TYPED_ENVELOPE);

    let first = processor.process(&record, &cancel).await.unwrap();
    let second = processor.process(&record, &cancel).await.unwrap();

    assert!(matches!(first, RecordOutcome::Delivered { .. }));
    match second {
        RecordOutcome::Duplicate { message_id } => assert_eq!(message_id, "m1"),
        other => panic!("expected Duplicate, got {:?}", other),
    }
    assert_eq!(sender.calls(), 1, "exactly one downstream send");
    assert!(quarantine.letters().is_empty());
}

/// Test: Two transient failures then success within a budget of 3 delivers
/// on the third invocation with no dead-letter
#[tokio::test]
async fn test_transient_failures_recover_within_budget() {
    let sender = FlakySender::new(2);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::new();
    let processor = processor(sender.clone(), store.clone(), quarantine.clone(), 3);
    let cancel = CancellationToken::new();

    let outcome = processor
        .process(&record_with(TYPED_ENVELOPE), &cancel)
        .await
        .unwrap();

    assert!(matches!(outcome, RecordOutcome::Delivered { .. }));
    assert_eq!(sender.calls(), 3);
    assert!(store.exists("m1").await.unwrap());
    assert!(quarantine.letters().is_empty());
}

/// Test: An unparseable body is quarantined with attempts = 0, a non-empty
/// error, and the raw body preserved byte-for-byte
#[tokio::test]
async fn test_unparseable_body_is_quarantined() {
    let sender = FlakySender::new(0);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::new();
    let processor = processor(sender.clone(), store.clone(), quarantine.clone(), 3);
    let cancel = CancellationToken::new();

    let outcome = processor
        .process(&record_with("not-json-at-all"), &cancel)
        .await
        .unwrap();

    assert!(matches!(outcome, RecordOutcome::Quarantined { attempts: 0, .. }));
    assert_eq!(sender.calls(), 0, "poison records never reach the sender");

    let letters = quarantine.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].original, "not-json-at-all");
    assert_eq!(letters[0].attempts, 0);
    assert!(!letters[0].error.is_empty());
}

/// Test: A parsed channel with no registered sender is quarantined with
/// attempts = 0 and never reaches the retry engine
#[tokio::test]
async fn test_unregistered_channel_is_quarantined_before_retry() {
    let sender = FlakySender::new(0);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::new();
    let processor = processor(sender.clone(), store.clone(), quarantine.clone(), 3);
    let cancel = CancellationToken::new();

    let payload =
        r#"{"Id":"m9","Content":{"Recipient":"+123","Subject":"Hi","Message":"Hello","Channel":"Sms"}}"#;
    let outcome = processor.process(&record_with(payload), &cancel).await.unwrap();

    match outcome {
        RecordOutcome::Quarantined { message_id, attempts } => {
            assert_eq!(message_id, "m9");
            assert_eq!(attempts, 0);
        }
        other => panic!("expected Quarantined, got {:?}", other),
    }
    assert_eq!(sender.calls(), 0);

    let letters = quarantine.letters();
    assert_eq!(letters.len(), 1);
    assert!(letters[0].error.contains("Sms"));
    assert!(!store.exists("m9").await.unwrap());
}

/// Test: Exhausted retries quarantine the record with the budget recorded
/// and the last error attached
#[tokio::test]
async fn test_exhausted_retries_are_quarantined() {
    let sender = FlakySender::new(u32::MAX);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::new();
    let processor = processor(sender.clone(), store.clone(), quarantine.clone(), 2);
    let cancel = CancellationToken::new();

    let outcome = processor
        .process(&record_with(TYPED_ENVELOPE), &cancel)
        .await
        .unwrap();

    match outcome {
        RecordOutcome::Quarantined { message_id, attempts } => {
            assert_eq!(message_id, "m1");
            assert_eq!(attempts, 2);
        }
        other => panic!("expected Quarantined, got {:?}", other),
    }
    assert_eq!(sender.calls(), 3, "budget of 2 means 3 invocations");

    let letters = quarantine.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].message_id, "m1");
    assert_eq!(letters[0].attempts, 2);
    assert!(letters[0].error.contains("451"));
    assert!(
        !store.exists("m1").await.unwrap(),
        "exhausted messages are not marked processed"
    );
}

/// Test: Cancellation yields the cancelled outcome with no side effects,
/// so the caller does not commit
#[tokio::test]
async fn test_cancellation_produces_no_side_effects() {
    let sender = FlakySender::new(0);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::new();
    let processor = processor(sender.clone(), store.clone(), quarantine.clone(), 3);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = processor
        .process(&record_with(TYPED_ENVELOPE), &cancel)
        .await
        .unwrap();

    assert!(matches!(outcome, RecordOutcome::Cancelled));
    assert_eq!(sender.calls(), 0);
    assert!(!store.exists("m1").await.unwrap());
    assert!(quarantine.letters().is_empty());
}

/// Test: A store failure surfaces as a transport-class error so the loop
/// skips the commit and the broker re-delivers
#[tokio::test]
async fn test_store_failure_is_transport_class() {
    struct BrokenStore;

    #[async_trait]
    impl ProcessedStore for BrokenStore {
        async fn exists(&self, _message_id: &str) -> Result<bool, RelayError> {
            Err(RelayError::Store("connection refused".to_string()))
        }

        async fn mark_processed(&self, _message_id: &str) -> Result<(), RelayError> {
            Err(RelayError::Store("connection refused".to_string()))
        }
    }

    let sender = FlakySender::new(0);
    let quarantine = RecordingQuarantine::new();
    let processor = processor(sender.clone(), Arc::new(BrokenStore), quarantine.clone(), 3);
    let cancel = CancellationToken::new();

    let err = processor
        .process(&record_with(TYPED_ENVELOPE), &cancel)
        .await
        .expect_err("store failure must not reach a terminal outcome");

    assert!(err.is_transport());
    assert_eq!(sender.calls(), 0);
    assert!(quarantine.letters().is_empty());
}

/// Test: A failing quarantine publish is escalated in logs only; the
/// record still reaches a committable outcome
#[tokio::test]
async fn test_quarantine_failure_still_commits() {
    let sender = FlakySender::new(0);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::failing();
    let processor = processor(sender, store, quarantine.clone(), 3);
    let cancel = CancellationToken::new();

    let outcome = processor
        .process(&record_with("not-json-at-all"), &cancel)
        .await
        .unwrap();

    assert!(matches!(outcome, RecordOutcome::Quarantined { attempts: 0, .. }));
    assert_eq!(quarantine.letters().len(), 1);
}

/// Test: The dead-letter wire format carries the original body and source
/// coordinates under the envelope the quarantine topic expects
#[tokio::test]
async fn test_dead_letter_wire_format() {
    let record = record_with("not-json-at-all");
    let dead = DeadLetter::new(&record, "invalid or unknown message schema", 0);
    let envelope = Envelope::new("m1", dead);

    let json = serde_json::to_value(&envelope).unwrap();

    assert_eq!(json["Id"], "m1");
    assert_eq!(json["Content"]["Original"], "not-json-at-all");
    assert_eq!(json["Content"]["Attempts"], 0);
    assert_eq!(json["Content"]["SourceTopic"], "email");
    assert_eq!(json["Content"]["SourcePartition"], 0);
    assert_eq!(json["Content"]["SourceOffset"], 42);
    assert!(json["Content"]["Error"].as_str().is_some_and(|e| !e.is_empty()));
    assert!(json["Content"]["Id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(json["Timestamp"].as_str().is_some());
}

/// Test: Timing of the retry path inside the pipeline follows the
/// configured schedule rather than compounding
#[tokio::test]
async fn test_pipeline_retry_uses_configured_schedule() {
    let sender = FlakySender::new(2);
    let store: Arc<dyn ProcessedStore> = Arc::new(InMemoryProcessedStore::new());
    let quarantine = RecordingQuarantine::new();
    let registry = SenderRegistry::new().register(Channel::Email, sender.clone() as Arc<dyn ChannelSender>);
    let processor = RecordProcessor::new(
        registry,
        store,
        quarantine,
        RetryPolicy::new(3, &[50]),
    );
    let cancel = CancellationToken::new();

    let start = tokio::time::Instant::now();
    let outcome = processor
        .process(&record_with(TYPED_ENVELOPE), &cancel)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(matches!(outcome, RecordOutcome::Delivered { .. }));
    assert!(elapsed >= Duration::from_millis(100), "two 50ms backoffs expected");
    assert!(elapsed < Duration::from_millis(500));
}
