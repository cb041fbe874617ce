//! Transition notifications.
//!
//! The monitor hands every transition to a [`Notifier`]. Delivery is
//! fire-and-forget: `notify` only enqueues, and a failure is returned so the
//! caller can log it, never retried. The default [`ChannelNotifier`] feeds the
//! [`WebhookDispatcher`](crate::webhook::WebhookDispatcher) over an mpsc channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::monitor::event::{EventKind, TransitionEvent};

pub const COLOR_UP: u32 = 0x32a858;
pub const COLOR_DOWN: u32 = 0xeb4034;
pub const DEFAULT_FOOTER: &str = "portwatch";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TransitionEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<TransitionEvent>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &TransitionEvent) -> Result<(), NotifyError> {
        self.tx.send(event.clone()).map_err(|_| NotifyError::Closed)
    }
}

pub fn notification_channel() -> (
    mpsc::UnboundedSender<TransitionEvent>,
    mpsc::UnboundedReceiver<TransitionEvent>,
) {
    mpsc::unbounded_channel()
}

/// Human-readable rendering of a transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMessage {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn render(event: &TransitionEvent) -> Self {
        let check_date = event.timestamp.format("%Y-%m-%d %H:%M:%S UTC");
        match event.kind {
            EventKind::Down => Self {
                title: format!("{} is now down!", event.endpoint_name),
                description: format!(
                    "**Hostname**: `{}`:{}\n**Check Date**: {}\n**Encountered Error**: Unreachable",
                    event.hostname, event.port, check_date
                ),
                color: COLOR_DOWN,
                footer: DEFAULT_FOOTER.to_string(),
                timestamp: event.timestamp,
            },
            EventKind::Up => Self {
                title: format!("{} is now up!", event.endpoint_name),
                description: format!(
                    "**Hostname**: {}:{}\n**Check Date**: {}\n**Downtime**: {} failed check{}",
                    event.hostname,
                    event.port,
                    check_date,
                    event.downtime,
                    if event.downtime == 1 { "" } else { "s" }
                ),
                color: COLOR_UP,
                footer: DEFAULT_FOOTER.to_string(),
                timestamp: event.timestamp,
            },
        }
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = footer.into();
        self
    }
}
