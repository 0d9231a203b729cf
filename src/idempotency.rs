use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RelayError;

/// Records which message ids have already produced a side effect.
///
/// The consumption loop converts at-least-once broker delivery into
/// at-most-once observable sends by consulting this store before invoking a
/// sender and marking the id only after a successful send.
#[async_trait]
pub trait ProcessedStore: Send + Sync {
    async fn exists(&self, message_id: &str) -> Result<bool, RelayError>;

    async fn mark_processed(&self, message_id: &str) -> Result<(), RelayError>;
}

/// Default store: a process-local set behind a mutex.
///
/// Ids are never evicted within the process lifetime, so this only protects
/// against duplicates observed by one running instance. Multi-instance
/// deployments substitute the Redis-backed store without caller changes.
#[derive(Debug, Default)]
pub struct InMemoryProcessedStore {
    ids: Mutex<HashSet<String>>,
}

impl InMemoryProcessedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedStore for InMemoryProcessedStore {
    async fn exists(&self, message_id: &str) -> Result<bool, RelayError> {
        let ids = self
            .ids
            .lock()
            .map_err(|e| RelayError::Store(format!("idempotency set poisoned: {}", e)))?;
        Ok(ids.contains(message_id))
    }

    async fn mark_processed(&self, message_id: &str) -> Result<(), RelayError> {
        let mut ids = self
            .ids
            .lock()
            .map_err(|e| RelayError::Store(format!("idempotency set poisoned: {}", e)))?;
        ids.insert(message_id.to_string());
        Ok(())
    }
}
