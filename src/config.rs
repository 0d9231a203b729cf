use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::retry::RetryPolicy;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub kafka_brokers: String,

    #[serde(default = "default_topic")]
    pub kafka_topic: String,

    #[serde(default = "default_group_id")]
    pub kafka_group_id: String,

    #[serde(default = "default_dlq_topic")]
    pub kafka_dlq_topic: String,

    /// Offset policy for a group with no committed offset. Defaults to
    /// `earliest` so a first run never silently skips backlog.
    #[serde(default = "default_offset_reset")]
    pub kafka_auto_offset_reset: String,

    #[serde(default = "default_session_timeout_ms")]
    pub kafka_session_timeout_ms: u64,

    #[serde(default = "default_max_poll_interval_ms")]
    pub kafka_max_poll_interval_ms: u64,

    #[serde(default = "default_reconnect_backoff_ms")]
    pub kafka_reconnect_backoff_ms: u64,

    #[serde(default = "default_reconnect_backoff_max_ms")]
    pub kafka_reconnect_backoff_max_ms: u64,

    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,

    #[serde(default = "default_send_backoff_ms")]
    pub send_backoff_ms: Vec<u64>,

    /// Pause after a broker transport error before the next poll; the
    /// uncommitted record is re-delivered by the broker.
    #[serde(default = "default_transport_backoff_ms")]
    pub transport_backoff_ms: u64,

    #[serde(default = "default_dlq_publish_timeout_ms")]
    pub dlq_publish_timeout_ms: u64,

    #[serde(default = "default_dlq_publish_backoff_ms")]
    pub dlq_publish_backoff_ms: Vec<u64>,

    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    pub smtp_from: String,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    #[serde(default)]
    pub smtp_use_tls: bool,

    /// When set, duplicate detection uses Redis with a TTL instead of the
    /// process-local set, so restarts and multiple instances share markers.
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_idempotency_ttl_seconds")]
    pub idempotency_ttl_seconds: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        match config.kafka_auto_offset_reset.as_str() {
            "earliest" | "latest" => {}
            other => {
                return Err(anyhow!(
                    "KAFKA_AUTO_OFFSET_RESET must be 'earliest' or 'latest', got '{}'",
                    other
                ));
            }
        }

        Ok(config)
    }

    pub fn send_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_send_attempts, &self.send_backoff_ms)
    }

    /// Bounded retry of the quarantine publish itself; after this budget
    /// the record is committed anyway so poison messages cannot wedge the
    /// partition behind a degraded dead-letter topic.
    pub fn dlq_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.dlq_publish_backoff_ms.len() as u32, &self.dlq_publish_backoff_ms)
    }
}

fn default_topic() -> String {
    "email".to_string()
}

fn default_group_id() -> String {
    "notification-consumers".to_string()
}

fn default_dlq_topic() -> String {
    "email.dlq".to_string()
}

fn default_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u64 {
    30_000
}

fn default_max_poll_interval_ms() -> u64 {
    300_000
}

fn default_reconnect_backoff_ms() -> u64 {
    1_000
}

fn default_reconnect_backoff_max_ms() -> u64 {
    10_000
}

fn default_max_send_attempts() -> u32 {
    3
}

fn default_send_backoff_ms() -> Vec<u64> {
    vec![500, 2_000, 5_000]
}

fn default_transport_backoff_ms() -> u64 {
    1_000
}

fn default_dlq_publish_timeout_ms() -> u64 {
    5_000
}

fn default_dlq_publish_backoff_ms() -> Vec<u64> {
    vec![100, 500, 2_000]
}

fn default_smtp_port() -> u16 {
    587
}

fn default_idempotency_ttl_seconds() -> u64 {
    86_400
}

fn default_server_port() -> u16 {
    8080
}
