use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Wire wrapper adding an id and timestamp around a typed payload.
///
/// Historical producers serialize PascalCase property names; parsing accepts
/// both cases. Every field is optional on input so shape discrimination in
/// the parser can fall through instead of erroring on a near-miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "Id", alias = "id", default)]
    pub id: Option<String>,

    #[serde(rename = "Content", alias = "content", default)]
    pub content: Option<T>,

    #[serde(rename = "Timestamp", alias = "timestamp", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl<T> Envelope<T> {
    pub fn new(id: impl Into<String>, content: T) -> Self {
        Self {
            id: Some(id.into()),
            content: Some(content),
            timestamp: Some(Utc::now()),
        }
    }

    /// The explicit envelope id, if present and non-blank.
    pub fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "Recipient", alias = "recipient")]
    pub recipient: String,

    #[serde(rename = "Subject", alias = "subject")]
    pub subject: String,

    #[serde(rename = "Message", alias = "message")]
    pub message: String,

    #[serde(rename = "Channel", alias = "channel", default)]
    pub channel: Channel,
}

/// Delivery channel, closed set. Unrecognized wire strings fail decoding,
/// which classifies the record as a permanent schema failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "Email",
            Channel::Sms => "Sms",
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::Email
    }
}

impl TryFrom<String> for Channel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            other => Err(format!("unsupported channel '{}'", other)),
        }
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.as_str().to_string()
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic fallback message id: identical payloads collapse to the
/// same idempotency key when the producer supplied no envelope id.
pub fn content_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
