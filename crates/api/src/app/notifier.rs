//! Outbound notifications (activation and password-reset mail).
//!
//! Delivery is a collaborator, not part of this service: the default
//! [`LogNotifier`] records delivery metadata only, never the token.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

/// What a notification is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Activation,
    PasswordReset,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Activation => "activation",
            NotificationKind::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub to: String,
    pub token: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) {
        info!(
            kind = notification.kind.as_str(),
            to = %notification.to,
            "notification queued"
        );
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Most recent token of `kind` sent to `to`.
    pub fn last_token(&self, kind: NotificationKind, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|n| n.kind == kind && n.to == to)
            .map(|n| n.token)
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}
