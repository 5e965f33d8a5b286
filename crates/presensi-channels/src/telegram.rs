//! Telegram Bot API channel — delivers via `sendMessage`.
//!
//! The target is the guardian's chat id, stored per subject as the opaque
//! `notification_target`.

use std::time::Duration;

use async_trait::async_trait;

use presensi_core::error::{PresensiError, Result};
use presensi_core::traits::channel::NotificationChannel;

pub struct TelegramChannel {
    bot_token: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, timeout: Duration) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, target: &str, message: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": target,
                "text": message,
            }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PresensiError::Channel(format!("telegram send failed: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(PresensiError::Channel(format!(
                "telegram API error {status}: {body}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name() {
        let ch = TelegramChannel::new("123:abc", Duration::from_secs(10));
        assert_eq!(ch.name(), "telegram");
    }

    #[tokio::test]
    async fn test_delivery_failure_is_channel_error() {
        // Bogus token + tight timeout: whether the request times out, fails
        // DNS, or gets rejected by the API, it must surface as a Channel
        // error, never a panic.
        let ch = TelegramChannel::new("123:abc", Duration::from_millis(50));
        let err = ch.send("chat-1", "hello").await.unwrap_err();
        assert!(matches!(err, PresensiError::Channel(_)));
    }
}
