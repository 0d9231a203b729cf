use thiserror::Error;

/// Failures the consumption pipeline can encounter, split by how the loop
/// reacts to them: permanent failures are dead-lettered and committed,
/// transient downstream failures are retried against the attempt budget,
/// transport failures are never committed so the broker re-delivers.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Payload matched none of the supported wire shapes.
    #[error("invalid or unknown message schema: {0}")]
    Schema(String),

    /// The channel decoded fine but no sender is registered for it.
    #[error("no sender registered for channel '{0}'")]
    UnsupportedChannel(String),

    /// Downstream delivery failed; retryable.
    #[error("send failed: {0}")]
    Send(String),

    /// Broker fetch/produce/commit failure.
    #[error("kafka transport error: {0}")]
    Transport(#[from] rdkafka::error::KafkaError),

    /// Idempotency store I/O failure.
    #[error("idempotency store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("shutdown in progress")]
    Cancelled,
}

impl RelayError {
    /// Permanent failures go straight to the dead-letter topic with
    /// `attempts = 0` and must never enter the retry engine.
    pub fn is_permanent(&self) -> bool {
        matches!(self, RelayError::Schema(_) | RelayError::UnsupportedChannel(_))
    }

    /// Transport-class failures leave the offset uncommitted so the record
    /// is re-delivered on the next poll.
    pub fn is_transport(&self) -> bool {
        matches!(self, RelayError::Transport(_) | RelayError::Store(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}
