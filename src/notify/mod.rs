//! Notification delivery for backoff-escalation alerts.
//!
//! One implementation per channel, selected by [`ChannelKind`]. Delivery is
//! fire-and-forget: failures are logged, never propagated, and an empty
//! recipient list is skipped rather than treated as an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

/// Delivery channel for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Chat,
}

impl ChannelKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "email" => Some(ChannelKind::Email),
            "chat" => Some(ChannelKind::Chat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Chat => "chat",
        }
    }
}

/// A notification to deliver.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub channel: ChannelKind,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// Notification collaborator interface the backoff controller depends on.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver the message. Must not fail the caller.
    async fn send(&self, message: &NotificationMessage);
}

/// Endpoint configuration for the built-in channels.
#[derive(Debug, Clone, Default)]
pub struct NotifierSettings {
    /// HTTP endpoint of the mail relay; alerts are dropped when unset.
    pub email_endpoint: Option<String>,
    pub email_from: String,
    /// Incoming-webhook URL for the chat channel; alerts are dropped when
    /// unset.
    pub chat_webhook_url: Option<String>,
}

/// Default notifier dispatching to the built-in email and chat channels.
pub struct Notifier {
    email: EmailChannel,
    chat: ChatChannel,
}

impl Notifier {
    pub fn new(settings: NotifierSettings) -> Self {
        let http = reqwest::Client::new();
        Self {
            email: EmailChannel {
                http: http.clone(),
                endpoint: settings.email_endpoint,
                from: settings.email_from,
            },
            chat: ChatChannel {
                http,
                webhook_url: settings.chat_webhook_url,
            },
        }
    }
}

#[async_trait]
impl NotificationSender for Notifier {
    async fn send(&self, message: &NotificationMessage) {
        if message.to.is_empty() && message.channel == ChannelKind::Email {
            debug!(
                subject = %message.subject,
                "No notification recipients configured; skipping"
            );
            return;
        }

        let result = match message.channel {
            ChannelKind::Email => self.email.deliver(message).await,
            ChannelKind::Chat => self.chat.deliver(message).await,
        };

        match result {
            Ok(()) => {
                info!(
                    channel = message.channel.as_str(),
                    subject = %message.subject,
                    recipients = message.to.len(),
                    "Dispatched notification"
                );
            }
            Err(err) => {
                error!(
                    channel = message.channel.as_str(),
                    subject = %message.subject,
                    error = %err,
                    "Failed to dispatch notification"
                );
            }
        }
    }
}

struct EmailChannel {
    http: reqwest::Client,
    endpoint: Option<String>,
    from: String,
}

impl EmailChannel {
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), reqwest::Error> {
        let Some(endpoint) = &self.endpoint else {
            warn!(
                subject = %message.subject,
                "Email endpoint not configured; dropping notification"
            );
            return Ok(());
        };

        self.http
            .post(endpoint)
            .json(&json!({
                "from": self.from,
                "to": message.to,
                "subject": message.subject,
                "text": message.text,
                "html": message.html,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

struct ChatChannel {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl ChatChannel {
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), reqwest::Error> {
        let Some(webhook_url) = &self.webhook_url else {
            warn!(
                subject = %message.subject,
                "Chat webhook not configured; dropping notification"
            );
            return Ok(());
        };

        self.http
            .post(webhook_url)
            .json(&json!({
                "text": format!("*{}*\n{}", message.subject, message.text),
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
