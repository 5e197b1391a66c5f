use async_trait::async_trait;
use mousetrap_model::{ErrorNotification, ScanNotification};

use crate::error::Result;

/// One notification provider (webhook, topic, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Channel that receives every notification, if the provider has one.
    fn default_channel(&self) -> Option<&str>;

    /// Whether this provider knows how to deliver to `channel`.
    fn accepts(&self, channel: &str) -> bool;

    async fn notify(
        &self,
        channel: &str,
        payload: &ScanNotification,
    ) -> Result<()>;

    async fn notify_error(
        &self,
        channel: &str,
        payload: &ErrorNotification,
    ) -> Result<()>;
}
