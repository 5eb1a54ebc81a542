//! `pipeflow-notify` — operator notification capability.
//!
//! The rest of the daemon only sees [`Notifier::notify`]: fire and
//! forget, best effort. Channel failures are logged and swallowed —
//! a broken bot token must never change a job's outcome or crash the
//! run-loop. Concrete channels (Telegram Bot API, SMTP email) are
//! selected by configuration and fanned out by [`NotifyRouter`].

pub mod email;
pub mod error;
pub mod telegram;

use async_trait::async_trait;
use pipeflow_core::NotifyConfig;
use tracing::warn;

pub use email::EmailNotifier;
pub use error::{NotifyError, Result};
pub use telegram::TelegramNotifier;

/// Fire-and-forget message delivery. Implementations must not let a
/// transport failure escape `notify`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Fans one message out to every configured channel.
pub struct NotifyRouter {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifyRouter {
    /// Build the router from config. Unknown channel names and
    /// channels named but not configured are logged and skipped.
    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();

        for name in &config.channels {
            match name.as_str() {
                "telegram" => match &config.telegram {
                    Some(tg) => channels.push(Box::new(TelegramNotifier::new(
                        tg.bot_token.clone(),
                        tg.chat_id.clone(),
                    ))),
                    None => warn!("notify channel 'telegram' enabled but not configured"),
                },
                "email" => match &config.email {
                    Some(em) => match EmailNotifier::from_config(em) {
                        Ok(n) => channels.push(Box::new(n)),
                        Err(e) => warn!("email notifier disabled: {e}"),
                    },
                    None => warn!("notify channel 'email' enabled but not configured"),
                },
                other => warn!("unknown notify channel: {other}"),
            }
        }

        Self { channels }
    }

    /// Router with an explicit channel list (used by tests).
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Notifier for NotifyRouter {
    async fn notify(&self, message: &str) {
        if self.channels.is_empty() {
            // Still observable: the daily log carries the failure, and
            // the tracing log carries the message itself.
            warn!("notification (no channels configured): {message}");
            return;
        }
        for channel in &self.channels {
            channel.notify(message).await;
        }
    }
}
