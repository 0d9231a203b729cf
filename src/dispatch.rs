use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::models::envelope::{Channel, NotificationRequest};

/// Downstream delivery capability for one channel. Errors raised here are
/// treated as retryable by the retry engine; anything permanent must be
/// rejected before dispatch.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(
        &self,
        request: &NotificationRequest,
        cancel: &CancellationToken,
    ) -> Result<(), RelayError>;

    fn name(&self) -> &'static str;
}

/// Registration map from channel tag to sender capability. A request whose
/// channel has no registered sender is a permanent failure, surfaced before
/// the retry engine ever runs.
#[derive(Default)]
pub struct SenderRegistry {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, channel: Channel, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    pub fn resolve(&self, channel: Channel) -> Result<&Arc<dyn ChannelSender>, RelayError> {
        self.senders
            .get(&channel)
            .ok_or_else(|| RelayError::UnsupportedChannel(channel.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
