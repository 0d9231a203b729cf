/// One fetched record, projected out of the broker client so the rest of
/// the pipeline never touches broker types. Owned by the consumption loop.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: String,
    pub headers: Vec<(String, Vec<u8>)>,
}

impl SourceRecord {
    /// Header copied onto dead-letter messages to name the topic the record
    /// originally came from. Any stale instance from an earlier hop is
    /// dropped before the fresh one is added.
    pub const ORIGIN_TOPIC_HEADER: &'static str = "x-original-topic";
}
