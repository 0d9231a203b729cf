use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use notification_relay::api::run_api_server;
use notification_relay::clients::dlq::{DeadLetterPublisher, QuarantineSink};
use notification_relay::clients::kafka::KafkaSource;
use notification_relay::clients::redis::RedisProcessedStore;
use notification_relay::clients::smtp::SmtpEmailSender;
use notification_relay::config::Config;
use notification_relay::dispatch::SenderRegistry;
use notification_relay::idempotency::{InMemoryProcessedStore, ProcessedStore};
use notification_relay::models::envelope::Channel;
use notification_relay::worker::{RecordProcessor, RelayWorker};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        topic = %config.kafka_topic,
        dlq_topic = %config.kafka_dlq_topic,
        group = %config.kafka_group_id,
        "starting notification relay worker"
    );

    let email_sender = Arc::new(SmtpEmailSender::connect(&config)?);
    let registry = SenderRegistry::new().register(Channel::Email, email_sender);

    let store: Arc<dyn ProcessedStore> = if config.redis_url.is_some() {
        Arc::new(RedisProcessedStore::connect(&config).await?)
    } else {
        info!("no REDIS_URL set, duplicate detection is process-local only");
        Arc::new(InMemoryProcessedStore::new())
    };

    let quarantine: Arc<dyn QuarantineSink> = Arc::new(DeadLetterPublisher::connect(&config)?);
    let source = KafkaSource::connect(&config)?;

    let processor = RecordProcessor::new(
        registry,
        store,
        quarantine.clone(),
        config.send_retry_policy(),
    );

    let cancel = CancellationToken::new();
    let worker = RelayWorker::new(
        source,
        processor,
        quarantine,
        cancel.clone(),
        Duration::from_millis(config.transport_backoff_ms),
    );

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received, draining");
            cancel.cancel();
        }
    });

    tokio::spawn({
        let config = config.clone();
        async move {
            if let Err(e) = run_api_server(config).await {
                error!(error = %e, "health server exited");
            }
        }
    });

    worker.run().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = async {
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
