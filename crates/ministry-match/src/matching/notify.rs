use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outbound notification hook (e-mail, push, in-app inbox adapters).
pub trait NotificationGateway: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMatches,
    AlternativeMatches,
    ApplicationReceived,
    NewApplication,
    ApplicationApproved,
    ApplicationRejected,
    RegistrationWithdrawn,
    BackgroundCheckRequested,
    BackgroundCheckCompleted,
}

/// Payload handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(
        recipient_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            action_url: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Fire-and-forget wrapper: a failed delivery is logged and dropped so it
/// can never roll back the transition that triggered it.
pub(crate) struct Notifier<N> {
    gateway: Arc<N>,
}

impl<N> Clone for Notifier<N> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<N> Notifier<N>
where
    N: NotificationGateway,
{
    pub(crate) fn new(gateway: Arc<N>) -> Self {
        Self { gateway }
    }

    pub(crate) fn dispatch(&self, notification: Notification) {
        let kind = notification.kind;
        let recipient = notification.recipient_id.clone();
        match self.gateway.notify(notification) {
            Ok(()) => debug!(?kind, %recipient, "notification dispatched"),
            Err(err) => warn!(?kind, %recipient, error = %err, "notification dropped"),
        }
    }
}
