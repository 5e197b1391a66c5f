use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use mousetrap_contracts::{BackendError, Notifier, Result};
use mousetrap_model::{ErrorNotification, ScanNotification};
use serde::Serialize;
use tracing::debug;
use url::Url;

/// Delivers notifications as JSON `POST`s to `http(s)://` channels.
#[derive(Clone)]
pub struct WebhookNotifier {
    name: String,
    client: reqwest::Client,
    default_channel: Option<String>,
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("name", &self.name)
            .field("default_channel", &self.default_channel)
            .finish()
    }
}

fn is_webhook_url(channel: &str) -> bool {
    Url::parse(channel)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

impl WebhookNotifier {
    pub fn new(
        name: impl Into<String>,
        default_channel: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if let Some(channel) = &default_channel
            && !is_webhook_url(channel)
        {
            return Err(BackendError::Misconfigured(format!(
                "webhook default channel is not an http(s) URL: {channel}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                BackendError::Misconfigured(format!(
                    "Failed to create HTTP client: {e}"
                ))
            })?;

        Ok(Self {
            name: name.into(),
            client,
            default_channel,
        })
    }

    async fn post<T: Serialize + Sync>(&self, channel: &str, payload: &T) -> Result<()> {
        let response = self
            .client
            .post(channel)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(format!("webhook {channel}: {e}"))
                } else {
                    BackendError::Unavailable(format!("webhook {channel}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "webhook {channel} answered {status}"
            )));
        }
        debug!(provider = %self.name, channel = %channel, %status, "webhook delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_channel(&self) -> Option<&str> {
        self.default_channel.as_deref()
    }

    fn accepts(&self, channel: &str) -> bool {
        is_webhook_url(channel)
    }

    async fn notify(&self, channel: &str, payload: &ScanNotification) -> Result<()> {
        self.post(channel, payload).await
    }

    async fn notify_error(
        &self,
        channel: &str,
        payload: &ErrorNotification,
    ) -> Result<()> {
        self.post(channel, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_http_channels() {
        let notifier =
            WebhookNotifier::new("webhook", None, Duration::from_secs(1)).unwrap();
        assert!(notifier.accepts("https://hooks.example.com/scan"));
        assert!(notifier.accepts("http://10.0.0.5:8080/hook"));
        assert!(!notifier.accepts("arn:aws:sns:eu-west-1:123:topic"));
        assert!(!notifier.accepts("ftp://example.com/x"));
        assert!(!notifier.accepts("not a url"));
    }

    #[test]
    fn rejects_non_http_default_channel() {
        let err = WebhookNotifier::new(
            "webhook",
            Some("sns:topic".into()),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }
}
