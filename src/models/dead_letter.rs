use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::record::SourceRecord;

/// Quarantine record published for a message that cannot or will not be
/// processed. Built once by the dead-letter publisher, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    #[serde(rename = "Id")]
    pub id: String,

    /// Raw body of the source record, preserved verbatim.
    #[serde(rename = "Original")]
    pub original: String,

    #[serde(rename = "Error")]
    pub error: String,

    /// Retry budget consumed before quarantine; 0 for poison records that
    /// never reached the retry engine.
    #[serde(rename = "Attempts")]
    pub attempts: u32,

    #[serde(rename = "SourceTopic")]
    pub source_topic: String,

    #[serde(rename = "SourcePartition")]
    pub source_partition: i32,

    #[serde(rename = "SourceOffset")]
    pub source_offset: i64,

    #[serde(rename = "FailedAt")]
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(record: &SourceRecord, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            original: record.payload.clone(),
            error: error.into(),
            attempts,
            source_topic: record.topic.clone(),
            source_partition: record.partition,
            source_offset: record.offset,
            failed_at: Utc::now(),
        }
    }
}
