use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::dispatch::ChannelSender;
use crate::error::RelayError;
use crate::models::envelope::NotificationRequest;

/// Email channel sender over SMTP. Address and transport faults surface as
/// retryable send errors; the retry engine owns the attempt budget.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpEmailSender {
    pub fn connect(config: &Config) -> Result<Self, RelayError> {
        let mut builder = if config.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| RelayError::Config(format!("invalid SMTP relay host: {}", e)))?
                .port(config.smtp_port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
        };

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(host = %config.smtp_host, port = config.smtp_port, "SMTP transport configured");

        Ok(Self {
            transport: builder.build(),
            from: config.smtp_from.clone(),
        })
    }

    fn build_message(&self, request: &NotificationRequest) -> Result<Message, RelayError> {
        let from = self
            .from
            .parse()
            .map_err(|e| RelayError::Send(format!("invalid from address '{}': {}", self.from, e)))?;
        let to = request.recipient.parse().map_err(|e| {
            RelayError::Send(format!("invalid recipient '{}': {}", request.recipient, e))
        })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&request.subject)
            .header(ContentType::TEXT_HTML)
            .body(request.message.clone())
            .map_err(|e| RelayError::Send(format!("failed to build email: {}", e)))
    }

    pub async fn test_connection(&self) -> Result<bool, RelayError> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| RelayError::Send(format!("SMTP connection test failed: {}", e)))
    }
}

#[async_trait]
impl ChannelSender for SmtpEmailSender {
    async fn send(
        &self,
        request: &NotificationRequest,
        cancel: &CancellationToken,
    ) -> Result<(), RelayError> {
        debug!(recipient = %request.recipient, subject = %request.subject, "sending email via SMTP");

        let message = self.build_message(request)?;

        let response = tokio::select! {
            result = self.transport.send(message) => {
                result.map_err(|e| RelayError::Send(format!("SMTP send failed: {}", e)))?
            }
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
        };

        info!(
            recipient = %request.recipient,
            code = %response.code(),
            "email accepted by SMTP server"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp-email"
    }
}
