//! One-time trusted-contact notifications.
//!
//! The dispatcher sends exactly one message per call and does no
//! deduplication of its own: the engine only calls it after winning the
//! ledger's alert latch. Delivery failures are reported, never raised.
//!
//! ## Channels
//!
//! - [`LogChannel`]: no transport configured, the alert is written to the log
//! - [`WebhookChannel`]: JSON POST to an email/SMS gateway (feature `webhook`)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::account::TrustedContact;
use crate::classifier::Severity;
use crate::error::{Result, SafetyError};

/// Default delivery timeout.
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 10;

/// Subject line used for every alert.
pub const ALERT_SUBJECT: &str = "IMPORTANT: Cyberbullying Alert for User";

/// Outbound delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Gateway endpoint. `None` means log-only delivery.
    pub webhook_url: Option<String>,
    /// Sender identity passed to the gateway.
    pub sender: String,
    /// Per-alert delivery timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            sender: "alerts@cybersafe.local".to_string(),
            timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
        }
    }
}

/// Transport for a single outbound message.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Sends one message. Returns false on any delivery failure.
    async fn send(&self, address: &str, subject: &str, body: &str) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Channel used when no transport is configured.
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, address: &str, subject: &str, _body: &str) -> bool {
        info!(to = %address, subject, "Alert logged (no delivery transport configured)");
        true
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Posts alerts to an HTTP gateway that relays email or SMS.
#[cfg(feature = "webhook")]
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    sender: String,
}

#[cfg(feature = "webhook")]
impl WebhookChannel {
    /// Creates a webhook channel.
    pub fn new(url: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            sender: sender.into(),
        }
    }
}

#[cfg(feature = "webhook")]
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[cfg(feature = "webhook")]
#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, address: &str, subject: &str, body: &str) -> bool {
        let payload = WebhookPayload {
            to: address,
            from: &self.sender,
            subject,
            body,
        };

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "Notification gateway rejected alert");
                false
            }
            Err(e) => {
                warn!("Failed to reach notification gateway: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Result of attempting to deliver an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// The channel accepted the message.
    Sent,
    /// The channel reported a failure.
    Failed,
    /// The channel did not answer within the timeout.
    TimedOut,
}

impl DispatchResult {
    /// Returns true if the notification was sent.
    pub fn was_sent(&self) -> bool {
        matches!(self, DispatchResult::Sent)
    }
}

/// Formats and sends trusted-contact alerts over a channel.
#[derive(Clone)]
pub struct AlertDispatcher {
    channel: Arc<dyn NotificationChannel>,
    timeout: Duration,
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("channel", &self.channel.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AlertDispatcher {
    /// Creates a dispatcher over a channel with the default timeout.
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            channel,
            timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS),
        }
    }

    /// Log-only dispatcher.
    pub fn log_only() -> Self {
        Self::new(Arc::new(LogChannel))
    }

    /// Builds the channel described by a config.
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        let channel: Arc<dyn NotificationChannel> = match &config.webhook_url {
            #[cfg(feature = "webhook")]
            Some(url) => Arc::new(WebhookChannel::new(url.clone(), config.sender.clone())),
            #[cfg(not(feature = "webhook"))]
            Some(_) => {
                return Err(SafetyError::Config(
                    "webhook_url set but the webhook feature is disabled".to_string(),
                ))
            }
            None => Arc::new(LogChannel),
        };

        if config.timeout_secs == 0 {
            return Err(SafetyError::Config(
                "notification timeout_secs must be positive".to_string(),
            ));
        }

        Ok(Self::new(channel).with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    /// Sets the delivery timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the underlying channel.
    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    /// Sends one alert and reports how delivery went.
    pub async fn dispatch(
        &self,
        contact: &TrustedContact,
        severity: Severity,
        message: &str,
    ) -> DispatchResult {
        let body = format_alert_body(contact, severity, message);
        let send = self
            .channel
            .send(&contact.contact_address, ALERT_SUBJECT, &body);

        match tokio::time::timeout(self.timeout, send).await {
            Ok(true) => DispatchResult::Sent,
            Ok(false) => DispatchResult::Failed,
            Err(_) => DispatchResult::TimedOut,
        }
    }

    /// Sends one alert. Returns false on failure or timeout.
    pub async fn notify(&self, contact: &TrustedContact, severity: Severity, message: &str) -> bool {
        self.dispatch(contact, severity, message).await.was_sent()
    }
}

/// Formats the alert body addressed to a contact.
pub fn format_alert_body(contact: &TrustedContact, severity: Severity, message: &str) -> String {
    format!(
        "Hello {},\n\n\
         Our system has detected a {} risk of cyberbullying activity on the user's device.\n\n\
         Summary: {}\n\n\
         Please check in with them.\n\n\
         This is an automated privacy-focused alert.",
        contact.name, severity, message
    )
}
