use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use mousetrap_contracts::Notifier;
use mousetrap_model::{ErrorNotification, ScanNotification};
use tracing::{debug, warn};

/// Fan-out over every configured notification provider.
///
/// Delivery is best effort: failures are logged per channel and never
/// reported to the caller as errors.
#[derive(Clone, Default)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl fmt::Debug for NotifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<&str> = self
            .notifiers
            .iter()
            .map(|n| type_name_of_val(n.as_ref()))
            .collect();
        f.debug_struct("NotifierSet")
            .field("providers", &providers)
            .finish()
    }
}

impl NotifierSet {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Task channels first, then each provider's default channel, without
    /// duplicates.
    pub fn merged_channels(&self, task_channels: &[String]) -> Vec<String> {
        let defaults = self
            .notifiers
            .iter()
            .filter_map(|n| n.default_channel());

        let mut merged: Vec<String> = Vec::with_capacity(task_channels.len());
        for channel in task_channels.iter().map(String::as_str).chain(defaults)
        {
            if channel.is_empty() || merged.iter().any(|c| c == channel) {
                continue;
            }
            merged.push(channel.to_string());
        }
        merged
    }

    fn provider_for(&self, channel: &str) -> Option<&Arc<dyn Notifier>> {
        self.notifiers.iter().find(|n| n.accepts(channel))
    }

    /// Deliver a scan result to every merged channel. Returns how many
    /// deliveries succeeded.
    pub async fn notify_all(
        &self,
        task_channels: &[String],
        payload: &ScanNotification,
    ) -> usize {
        let mut delivered = 0;
        for channel in self.merged_channels(task_channels) {
            let Some(provider) = self.provider_for(&channel) else {
                warn!(
                    channel = %channel,
                    file = %payload.file_path,
                    "no notification provider accepts channel"
                );
                continue;
            };
            match provider.notify(&channel, payload).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(
                        step = "notify",
                        provider = provider.name(),
                        channel = %channel,
                        file = %payload.file_path,
                        success = true,
                        "scan notification delivered"
                    );
                }
                Err(err) => warn!(
                    step = "notify",
                    provider = provider.name(),
                    channel = %channel,
                    file = %payload.file_path,
                    success = false,
                    error = %err,
                    "scan notification failed"
                ),
            }
        }
        delivered
    }

    pub async fn notify_error_all(
        &self,
        task_channels: &[String],
        payload: &ErrorNotification,
    ) -> usize {
        let mut delivered = 0;
        for channel in self.merged_channels(task_channels) {
            let Some(provider) = self.provider_for(&channel) else {
                warn!(
                    channel = %channel,
                    file = %payload.file_path,
                    "no notification provider accepts channel"
                );
                continue;
            };
            match provider.notify_error(&channel, payload).await {
                Ok(()) => delivered += 1,
                Err(err) => warn!(
                    step = "notify_error",
                    provider = provider.name(),
                    channel = %channel,
                    file = %payload.file_path,
                    success = false,
                    error = %err,
                    "error notification failed"
                ),
            }
        }
        delivered
    }
}
