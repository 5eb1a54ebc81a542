//! Email channel — async SMTP with STARTTLS via lettre.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::error::{NotifyError, Result};
use crate::Notifier;

const SUBJECT: &str = "Pipeflow scheduler alert";

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    to: String,
}

impl EmailNotifier {
    /// Build the SMTP transport from config. Fails only on malformed
    /// server settings; connection problems surface per-send and are
    /// swallowed there.
    pub fn from_config(config: &pipeflow_core::config::EmailConfig) -> Result<Self> {
        let user = config.user.clone().unwrap_or_else(|| config.from.clone());
        let creds = Credentials::new(user, config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .map_err(|e| NotifyError::Email(format!("SMTP relay: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self {
            mailer,
            from: config.from.clone(),
            to: config.to.clone(),
        })
    }

    async fn send(&self, message: &str) -> Result<()> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| NotifyError::Email(format!("invalid from address: {e}")))?,
            )
            .to(self
                .to
                .parse()
                .map_err(|e| NotifyError::Email(format!("invalid to address: {e}")))?)
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .map_err(|e| NotifyError::Email(format!("build message: {e}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Email(format!("SMTP send: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, message: &str) {
        match self.send(message).await {
            Ok(()) => info!(to = %self.to, "email notification sent"),
            Err(e) => warn!("email notification failed: {e}"),
        }
    }
}
