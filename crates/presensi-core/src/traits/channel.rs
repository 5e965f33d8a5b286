//! Notification channel — abstracts whatever messaging API delivers to
//! guardians/supervisors behind a single `send`.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one message to an opaque target address. Implementations must
    /// bound the call with a timeout; the dispatcher treats any `Err` as a
    /// delivery failure for that attempt.
    async fn send(&self, target: &str, message: &str) -> Result<()>;
}
