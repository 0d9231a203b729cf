use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::info;

use crate::config::Config;
use crate::error::RelayError;
use crate::idempotency::ProcessedStore;

/// Durable idempotency store keyed in Redis with a TTL, for deployments
/// where markers must survive restarts or be shared across instances.
pub struct RedisProcessedStore {
    connection: MultiplexedConnection,
    ttl_seconds: u64,
}

impl RedisProcessedStore {
    pub async fn connect(config: &Config) -> Result<Self, RelayError> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| RelayError::Config("REDIS_URL is not set".to_string()))?;

        let client = Client::open(url)
            .map_err(|e| RelayError::Config(format!("invalid redis url: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RelayError::Store(format!("failed to connect to redis: {}", e)))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            ttl_seconds: config.idempotency_ttl_seconds,
        })
    }

    fn key(message_id: &str) -> String {
        format!("processed:{}", message_id)
    }
}

#[async_trait]
impl ProcessedStore for RedisProcessedStore {
    async fn exists(&self, message_id: &str) -> Result<bool, RelayError> {
        let mut conn = self.connection.clone();
        conn.exists(Self::key(message_id))
            .await
            .map_err(|e| RelayError::Store(format!("failed to check processed marker: {}", e)))
    }

    async fn mark_processed(&self, message_id: &str) -> Result<(), RelayError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(Self::key(message_id), "1", self.ttl_seconds)
            .await
            .map_err(|e| RelayError::Store(format!("failed to set processed marker: {}", e)))
    }
}
