use crate::error::RelayError;
use crate::models::envelope::{Envelope, NotificationRequest, content_hash};

/// A decoded record: the stable idempotency key plus the typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub message_id: String,
    pub request: NotificationRequest,
}

/// Decodes a raw body into `(message_id, NotificationRequest)`, tolerating
/// the three wire shapes producers have used over time:
///
/// 1. a typed envelope whose `Content` is the request;
/// 2. an envelope whose `Content` is a JSON string holding the request;
/// 3. the bare request with no envelope at all.
///
/// The message id prefers the explicit envelope id and falls back to a
/// content hash, so identical payloads collapse to the same key. Decode
/// faults never escape as panics or raw serde errors; failing all three
/// shapes is a permanent schema failure and the caller keeps the raw body
/// for dead-lettering.
pub fn parse(raw: &str) -> Result<ParsedMessage, RelayError> {
    if let Ok(envelope) = serde_json::from_str::<Envelope<NotificationRequest>>(raw) {
        if let Some(request) = envelope.content.clone() {
            let message_id = envelope
                .explicit_id()
                .map(str::to_string)
                .unwrap_or_else(|| content_hash(raw));
            return Ok(ParsedMessage { message_id, request });
        }
    }

    if let Ok(envelope) = serde_json::from_str::<Envelope<String>>(raw) {
        if let Some(inner) = envelope.content.as_deref().filter(|s| !s.trim().is_empty()) {
            if let Ok(request) = serde_json::from_str::<NotificationRequest>(inner) {
                let message_id = envelope
                    .explicit_id()
                    .map(str::to_string)
                    .unwrap_or_else(|| content_hash(inner));
                return Ok(ParsedMessage { message_id, request });
            }
        }
    }

    match serde_json::from_str::<NotificationRequest>(raw) {
        Ok(request) => Ok(ParsedMessage {
            message_id: content_hash(raw),
            request,
        }),
        Err(err) => Err(RelayError::Schema(format!(
            "payload matches no known wire shape: {}",
            err
        ))),
    }
}
