use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use rdkafka::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::clients::smtp::SmtpEmailSender;
use crate::config::Config;
use crate::models::health::{HealthCheckResponse, HealthStatus, ServiceHealth};

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HealthChecker {
    config: Config,
}

impl HealthChecker {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        let broker_health = self.check_broker().await;
        checks.insert("message_broker".to_string(), broker_health);

        let smtp_health = self.check_smtp().await;
        checks.insert("smtp".to_string(), smtp_health);

        if self.config.redis_url.is_some() {
            let redis_health = self.check_redis().await;
            checks.insert("idempotency_store".to_string(), redis_health);
        }

        let overall_status = self.determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_broker(&self) -> ServiceHealth {
        let start = Instant::now();
        let brokers = self.config.kafka_brokers.clone();
        let topic = self.config.kafka_topic.clone();

        let result = tokio::task::spawn_blocking(move || {
            let consumer: BaseConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .create()
                .map_err(|e| e.to_string())?;
            consumer
                .fetch_metadata(Some(&topic), METADATA_TIMEOUT)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Kafka health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Kafka health check failed");
                ServiceHealth::unhealthy(format!("Metadata fetch failed: {}", e))
            }
            Err(e) => {
                warn!(error = %e, "Kafka health check task failed");
                ServiceHealth::unhealthy(format!("Check task failed: {}", e))
            }
        }
    }

    async fn check_smtp(&self) -> ServiceHealth {
        let start = Instant::now();

        match SmtpEmailSender::connect(&self.config) {
            Ok(sender) => match sender.test_connection().await {
                Ok(true) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    debug!(response_time_ms = elapsed, "SMTP health check passed");
                    ServiceHealth::healthy(elapsed)
                }
                Ok(false) => {
                    warn!("SMTP server rejected connection test");
                    ServiceHealth::unhealthy("Connection test rejected".to_string())
                }
                Err(e) => {
                    warn!(error = %e, "SMTP connection test failed");
                    ServiceHealth::unhealthy(format!("Connection test failed: {}", e))
                }
            },
            Err(e) => {
                warn!(error = %e, "SMTP transport configuration failed");
                ServiceHealth::unhealthy(format!("Transport configuration failed: {}", e))
            }
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();
        let url = match self.config.redis_url.as_deref() {
            Some(url) => url,
            None => return ServiceHealth::unhealthy("REDIS_URL not configured".to_string()),
        };

        match redis::Client::open(url) {
            Ok(client) => match client.get_multiplexed_async_connection().await {
                Ok(mut conn) => match conn.ping::<String>().await {
                    Ok(_) => {
                        let elapsed = start.elapsed().as_millis() as u64;
                        debug!(response_time_ms = elapsed, "Redis health check passed");
                        ServiceHealth::healthy(elapsed)
                    }
                    Err(e) => {
                        warn!(error = %e, "Redis ping failed");
                        ServiceHealth::unhealthy(format!("Ping failed: {}", e))
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Redis connection failed");
                    ServiceHealth::unhealthy(format!("Connection failed: {}", e))
                }
            },
            Err(e) => {
                warn!(error = %e, "Redis client creation failed");
                ServiceHealth::unhealthy(format!("Client creation failed: {}", e))
            }
        }
    }

    fn determine_overall_status(&self, checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let critical_unhealthy = checks
            .iter()
            .filter(|(name, _)| name.as_str() == "message_broker" || name.as_str() == "smtp")
            .any(|(_, health)| health.status == HealthStatus::Unhealthy);

        let has_unhealthy = checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status == HealthStatus::Degraded);

        if critical_unhealthy {
            HealthStatus::Unhealthy
        } else if has_unhealthy || has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
