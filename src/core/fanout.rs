//! Notification fan-out
//!
//! Runs entirely in detached tasks: by the time a notification is being
//! formatted, the sender already has its ack. Failures here are logged
//! and swallowed, never surfaced to the original caller.

use log::{debug, warn};
use std::sync::Arc;

use crate::core::message_types::ServerEvent;
use crate::core::registry::ConnectionRegistry;
use crate::storage::traits::{NotificationRecord, NotificationStore, PushPayload, PushSink};

/// Kinds of notifications the relay emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    DirectMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DirectMessage => "message",
        }
    }

    /// Human-readable notification text
    fn render(&self, sender_name: &str) -> String {
        match self {
            NotificationKind::DirectMessage => format!("{} sent you a message", sender_name),
        }
    }
}

/// Formats and emits typed notifications to a recipient's live
/// connections, persists the record, and pushes best-effort.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<ConnectionRegistry>,
    notifications: Arc<dyn NotificationStore>,
    push: Arc<dyn PushSink>,
}

impl Notifier {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        notifications: Arc<dyn NotificationStore>,
        push: Arc<dyn PushSink>,
    ) -> Self {
        Self {
            registry,
            notifications,
            push,
        }
    }

    /// Notify a recipient about an event from a sender. Detached: the
    /// caller is never blocked and never sees failures from here.
    pub fn notify(&self, recipient: String, sender: String, kind: NotificationKind, link: String) {
        let registry = self.registry.clone();
        let notifications = self.notifications.clone();
        let push = self.push.clone();

        tokio::spawn(async move {
            let sender_name = registry.display_name(&sender).await;
            let message = kind.render(&sender_name);

            let record = NotificationRecord::new(
                recipient.clone(),
                sender.clone(),
                kind.as_str(),
                message.clone(),
                link.clone(),
            );
            if let Err(e) = notifications.create(record).await {
                warn!("failed to persist notification for {}: {}", recipient, e);
            }

            let event = ServerEvent::Notification {
                sender_id: sender,
                kind: kind.as_str().to_string(),
                message: message.clone(),
                link: link.clone(),
                count: 1,
            };
            let reached = registry.send_to_identity(&recipient, &event);
            if reached == 0 {
                debug!("{} offline; notification kept for later pull", recipient);
            }

            let outcome = push
                .send(
                    &recipient,
                    PushPayload {
                        title: sender_name,
                        body: message,
                        link,
                    },
                )
                .await;
            if !outcome.success {
                debug!("push to {} failed: {:?}", recipient, outcome.reason);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryNotificationStore, InMemoryUserDirectory, LogPushSink};
    use std::time::Duration;

    #[tokio::test]
    async fn test_notify_persists_single_record() {
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(
            InMemoryUserDirectory::new(),
        )));
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let notifier = Notifier::new(
            registry,
            notifications.clone(),
            Arc::new(LogPushSink::new()),
        );

        notifier.notify(
            "bob".to_string(),
            "alice".to_string(),
            NotificationKind::DirectMessage,
            "/messages/alice".to_string(),
        );

        // The work is detached; give it a moment to land
        tokio::time::sleep(Duration::from_millis(50)).await;

        let records = notifications.for_recipient("bob");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].count, 1);
        assert_eq!(records[0].kind, "message");
    }
}
