//! Telegram channel — plain Bot API `sendMessage` over HTTP.
//!
//! Messages are sent as plain text (no parse mode) so error excerpts
//! containing Markdown metacharacters never make the API reject the
//! request.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{NotifyError, Result};
use crate::Notifier;

/// Telegram message size limit is 4096 characters; leave headroom.
const MESSAGE_MAX: usize = 4000;

pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
    /// Overridable for tests; defaults to the public Bot API host.
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            chat_id,
            base_url: "https://api.telegram.org".to_string(),
        }
    }

    #[doc(hidden)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn send(&self, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let text = truncate(message, MESSAGE_MAX);

        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
            }))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(NotifyError::Telegram(format!("{status}: {body}")))
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        match self.send(message).await {
            Ok(()) => info!("Telegram notification sent"),
            Err(e) => warn!("Telegram notification failed: {e}"),
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    // Back off to a char boundary so the slice is always valid UTF-8.
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_untouched() {
        assert_eq!(truncate("hello", MESSAGE_MAX), "hello");
    }

    #[test]
    fn long_message_truncated_at_char_boundary() {
        let text = "é".repeat(3000); // 6000 bytes
        let cut = truncate(&text, MESSAGE_MAX);
        assert!(cut.len() <= MESSAGE_MAX);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        let notifier = TelegramNotifier::new("token".into(), "42".into())
            .with_base_url("http://127.0.0.1:1".into());
        // Must not panic or propagate the connection error.
        notifier.notify("boom").await;
    }
}
