//! Generic HTTP webhook channel — POSTs a JSON body to a configured URL.
//!
//! Useful for school information systems that want the raw event instead of
//! a chat message; the `target` travels in the body so one endpoint can fan
//! out per guardian.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use presensi_core::error::{PresensiError, Result};
use presensi_core::traits::channel::NotificationChannel;

pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, target: &str, message: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "target": target,
                "message": message,
                "sent_at": Utc::now().to_rfc3339(),
            }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PresensiError::Channel(format!("webhook send failed: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(PresensiError::Channel(format!(
                "webhook error {}",
                resp.status()
            )))
        }
    }
}
