//! # Presensi Channels
//!
//! `NotificationChannel` implementations. Each channel hides one messaging
//! API behind the single `send(target, message)` seam; the dispatcher never
//! knows which one it is talking to.

pub mod telegram;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;

use presensi_core::config::NotifyConfig;
use presensi_core::error::{PresensiError, Result};
use presensi_core::traits::channel::NotificationChannel;

pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;

/// Log-only channel for deployments without a configured messaging API.
/// Deliveries always succeed.
pub struct NullChannel;

#[async_trait]
impl NotificationChannel for NullChannel {
    fn name(&self) -> &str {
        "null"
    }

    async fn send(&self, target: &str, message: &str) -> Result<()> {
        tracing::info!(target = %target, "📢 (log-only) {message}");
        Ok(())
    }
}

/// Build the configured channel. Called once at startup.
pub fn channel_from_config(config: &NotifyConfig) -> Result<Arc<dyn NotificationChannel>> {
    let timeout = std::time::Duration::from_secs(config.send_timeout_secs);
    match config.channel.as_str() {
        "none" => Ok(Arc::new(NullChannel)),
        "telegram" => {
            if config.bot_token.is_empty() {
                return Err(PresensiError::Config(
                    "notify.channel is 'telegram' but notify.bot_token is empty".into(),
                ));
            }
            Ok(Arc::new(TelegramChannel::new(&config.bot_token, timeout)))
        }
        "webhook" => {
            if config.webhook_url.is_empty() {
                return Err(PresensiError::Config(
                    "notify.channel is 'webhook' but notify.webhook_url is empty".into(),
                ));
            }
            Ok(Arc::new(WebhookChannel::new(&config.webhook_url, timeout)))
        }
        other => Err(PresensiError::Config(format!(
            "unknown notification channel '{other}' (expected none/telegram/webhook)"
        ))),
    }
}
