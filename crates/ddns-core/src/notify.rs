//! Notifications about record changes and bans.

use async_trait::async_trait;

/// Receives human readable notifications from the updater.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. Delivery failures are the notifier's concern.
    async fn notify(&self, message: &str);
}

/// Notifier writing messages to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        tracing::info!(target: "ddns::notify", "{}", message);
    }
}
