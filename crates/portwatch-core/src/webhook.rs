//! Webhook notification delivery.
//!
//! The monitor pushes transitions through an mpsc channel. The
//! [`WebhookDispatcher`] reads from that channel and POSTs a payload to every
//! configured webhook endpoint, either as a Discord-style embed or as a
//! versioned JSON envelope.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::monitor::event::TransitionEvent;
use crate::notify::NotificationMessage;

pub const SIGNATURE_HEADER: &str = "X-Portwatch-Signature-256";

/// Upper bound on retries per delivery, whatever a webhook asks for.
pub const MAX_WEBHOOK_RETRIES: u32 = 10;

const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookFormat {
    #[default]
    Discord,
    Json,
}

/// Configuration for a single webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// The URL to POST payloads to.
    pub url: String,

    #[serde(default)]
    pub format: WebhookFormat,

    /// Which notification types to deliver (`endpoint_down`, `endpoint_up`). Empty means all.
    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_webhook_retries")]
    pub max_retries: u32,

    /// Optional HMAC-SHA256 signing secret for the signature header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Display name override for Discord webhooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

fn default_webhook_retries() -> u32 {
    2
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: WebhookFormat::default(),
            events: vec![],
            timeout_ms: default_webhook_timeout_ms(),
            max_retries: default_webhook_retries(),
            secret: None,
            username: None,
            avatar_url: None,
            footer: None,
        }
    }

    pub fn accepts(&self, notification_type: &str) -> bool {
        if self.events.is_empty() {
            return true;
        }
        self.events.iter().any(|e| e == notification_type)
    }

    fn message(&self, event: &TransitionEvent) -> NotificationMessage {
        let message = NotificationMessage::render(event);
        match &self.footer {
            Some(footer) => message.with_footer(footer.clone()),
            None => message,
        }
    }

    /// Serialize the request body for this webhook.
    pub fn body(&self, event: &TransitionEvent) -> Result<Vec<u8>, serde_json::Error> {
        let message = self.message(event);
        match self.format {
            WebhookFormat::Discord => {
                serde_json::to_vec(&DiscordPayload::new(&message, self.username.clone(), self.avatar_url.clone()))
            }
            WebhookFormat::Json => serde_json::to_vec(&WebhookPayload::new(event, &message)),
        }
    }
}

/// The JSON envelope POSTed to `json` webhooks.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub version: u8,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub endpoint: String,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    pub fn new(event: &TransitionEvent, message: &NotificationMessage) -> Self {
        Self {
            version: 1,
            id: event.id.clone(),
            timestamp: event.timestamp,
            notification_type: event.kind.notification_type().to_string(),
            endpoint: event.endpoint_name.clone(),
            data: serde_json::json!({
                "kind": event.kind,
                "hostname": event.hostname,
                "port": event.port,
                "downtime": event.downtime,
                "title": message.title,
                "description": message.description,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub footer: DiscordFooter,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscordFooter {
    pub text: String,
}

impl DiscordPayload {
    pub fn new(
        message: &NotificationMessage,
        username: Option<String>,
        avatar_url: Option<String>,
    ) -> Self {
        Self {
            username,
            avatar_url,
            embeds: vec![DiscordEmbed {
                title: message.title.clone(),
                description: message.description.clone(),
                color: message.color,
                footer: DiscordFooter {
                    text: message.footer.clone(),
                },
                timestamp: message.timestamp,
            }],
        }
    }
}

/// Asynchronous webhook dispatcher.
///
/// Spawned as a background tokio task, it reads from the notification channel
/// and POSTs payloads to all configured webhook endpoints. Failed deliveries
/// are logged and dropped.
pub struct WebhookDispatcher {
    rx: mpsc::UnboundedReceiver<TransitionEvent>,
    webhooks: Vec<WebhookConfig>,
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(
        rx: mpsc::UnboundedReceiver<TransitionEvent>,
        webhooks: Vec<WebhookConfig>,
        client: Client,
    ) -> Self {
        Self {
            rx,
            webhooks,
            client,
        }
    }

    /// Run the dispatcher loop. Returns when all senders are dropped.
    pub async fn run(mut self) {
        debug!(
            webhook_count = self.webhooks.len(),
            "Webhook dispatcher started"
        );

        while let Some(event) = self.rx.recv().await {
            let notification_type = event.kind.notification_type();

            for wh in &self.webhooks {
                if !wh.accepts(notification_type) {
                    continue;
                }

                let body = match wh.body(&event) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize webhook payload");
                        continue;
                    }
                };

                let timeout = Duration::from_millis(wh.timeout_ms);

                if let Err(e) = deliver(
                    &self.client,
                    &wh.url,
                    &body,
                    wh.secret.as_deref(),
                    timeout,
                    wh.max_retries,
                )
                .await
                {
                    warn!(
                        url = %wh.url,
                        endpoint = %event.endpoint_name,
                        notification_type,
                        error = %e,
                        "Webhook delivery failed"
                    );
                } else {
                    debug!(url = %wh.url, notification_type, "Webhook delivered");
                }
            }
        }

        debug!("Webhook dispatcher shutting down");
    }
}

async fn deliver(
    client: &Client,
    url: &str,
    body: &[u8],
    secret: Option<&str>,
    timeout: Duration,
    max_retries: u32,
) -> Result<(), String> {
    let mut last_error = String::new();

    for attempt in 0..=max_retries.min(MAX_WEBHOOK_RETRIES) {
        if attempt > 0 {
            tokio::time::sleep(retry_backoff(attempt)).await;
        }

        let mut req = client
            .post(url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "portwatch/0.1")
            .timeout(timeout)
            .body(body.to_vec());

        if let Some(secret) = secret {
            let signature = sign_payload(body, secret);
            req = req.header(SIGNATURE_HEADER, format!("sha256={}", signature));
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                let status = resp.status();
                last_error = format!("HTTP {} from {}", status, url);
                if status.is_client_error() && status.as_u16() != 429 {
                    return Err(last_error);
                }
            }
            Err(e) => {
                last_error = format!("Request to {} failed: {}", url, e);
            }
        }
    }

    Err(last_error)
}

/// Delay before retry `attempt` (1-based): doubles from 500ms, capped at 30s.
fn retry_backoff(attempt: u32) -> Duration {
    2u32.checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| BASE_BACKOFF.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
