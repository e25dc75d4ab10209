//! Integrated relay service that coordinates the registry, the rate
//! limiter, the dedup cache, and the collaborators
//!
//! Every send operation walks the same path: validate, rate-check,
//! dedup/persist, emit, ack. Validation and rate failures short-circuit
//! before any side effect; the delivery emission always precedes the
//! ack; notification work runs detached after it.

use log::{debug, warn};
use std::sync::Arc;

use crate::constants::{LOUNGE_ROOM, MAX_CONTENT_LENGTH};
use crate::core::connection::Connection;
use crate::core::dedup::{fingerprint, DedupCache};
use crate::core::fanout::{NotificationKind, Notifier};
use crate::core::message_types::{SendAck, ServerEvent};
use crate::core::rate_limit::{EventKind, RateLimiter};
use crate::core::registry::ConnectionRegistry;
use crate::error::{AckCode, RelayError, Result};
use crate::storage::traits::{MessageRecord, MessageStore};

pub struct RealtimeServer {
    registry: Arc<ConnectionRegistry>,
    rate_limiter: Arc<RateLimiter>,
    dedup: Arc<DedupCache>,
    messages: Arc<dyn MessageStore>,
    notifier: Notifier,
}

impl RealtimeServer {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rate_limiter: Arc<RateLimiter>,
        dedup: Arc<DedupCache>,
        messages: Arc<dyn MessageStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            registry,
            rate_limiter,
            dedup,
            messages,
            notifier,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register an authenticated connection and auto-join the lounge.
    /// Returns the connection id driving later per-connection calls.
    pub fn register_connection(&self, identity: &str, conn: Connection) -> String {
        let conn_id = conn.id.clone();
        self.registry.register(identity, conn);
        self.registry.join_room(LOUNGE_ROOM, identity, &conn_id);
        conn_id
    }

    /// Disconnect cleanup: room bookkeeping first, then presence
    pub fn disconnect(&self, identity: &str, conn_id: &str) {
        self.registry.remove_connection_from_rooms(identity, conn_id);
        self.registry.unregister(identity, conn_id);
    }

    pub fn join_room(&self, identity: &str, conn_id: &str, room: &str) -> Result<()> {
        let room = room.trim();
        if room.is_empty() || room.len() > 64 {
            return Err(RelayError::ValidationError("invalid room name".to_string()));
        }
        self.registry.join_room(room, identity, conn_id);
        Ok(())
    }

    pub fn leave_room(&self, identity: &str, conn_id: &str, room: &str) -> Result<()> {
        if room == LOUNGE_ROOM {
            return Err(RelayError::ValidationError(
                "cannot leave the lounge".to_string(),
            ));
        }
        self.registry.leave_room(room, identity, conn_id)
    }

    /// Structural checks shared by both message kinds. Returns the
    /// trimmed content on success.
    fn validate_content(content: &str, attachment: Option<&String>) -> Result<String> {
        let trimmed = content.trim();
        if trimmed.is_empty() && attachment.is_none() {
            return Err(RelayError::ValidationError(
                "message needs content or an attachment".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_CONTENT_LENGTH {
            return Err(RelayError::ValidationError(format!(
                "message exceeds {} characters",
                MAX_CONTENT_LENGTH
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Deliver a direct message. Produces exactly one ack on every
    /// path; a detected retry acks success with the stored record.
    pub async fn send_direct_message(
        &self,
        sender: &str,
        recipient: &str,
        content: &str,
        attachment: Option<String>,
        correlation_token: Option<String>,
    ) -> SendAck {
        let content = match Self::validate_content(content, attachment.as_ref()) {
            Ok(content) => content,
            Err(e) => {
                debug!("invalid direct message from {}: {}", sender, e);
                return SendAck::rejected(AckCode::InvalidPayload, correlation_token);
            }
        };

        if !self.rate_limiter.allow(sender, EventKind::DirectMessage).await {
            return SendAck::rejected(AckCode::RateLimited, correlation_token);
        }

        let candidate = MessageRecord::direct(
            sender,
            recipient,
            content.clone(),
            attachment,
            correlation_token.clone(),
        );
        let fp = fingerprint(
            sender,
            &candidate.target.key(),
            &content,
            candidate.created_at.timestamp_millis(),
        );

        let outcome = match self
            .dedup
            .create_if_absent(&fp, self.messages.as_ref(), candidate)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("persist failed for direct message from {}: {}", sender, e);
                return SendAck::rejected(AckCode::PersistFailed, correlation_token);
            }
        };

        if !outcome.is_duplicate {
            let record = &outcome.record;
            let event = ServerEvent::DirectMessage {
                record_id: record.id.clone(),
                sender_id: sender.to_string(),
                sender_name: self.registry.display_name(sender).await,
                content: record.content.clone(),
                attachment: record.attachment.clone(),
                timestamp: record.created_at,
            };
            // Delivery precedes the ack; latency stays in-memory
            let reached = self.registry.send_to_identity(recipient, &event);
            debug!(
                "direct message {} reached {} connections of {}",
                record.id, reached, recipient
            );

            self.notifier.notify(
                recipient.to_string(),
                sender.to_string(),
                NotificationKind::DirectMessage,
                format!("/messages/{}", sender),
            );
        }

        SendAck::delivered(outcome.record.id.clone(), outcome.is_duplicate, correlation_token)
    }

    /// Deliver a room broadcast. A room with no joined connections is
    /// still a successful send: the record persists, nobody is emitted
    /// to.
    pub async fn send_room_message(
        &self,
        sender: &str,
        origin_conn: &str,
        room: &str,
        content: &str,
        attachment: Option<String>,
    ) -> SendAck {
        let content = match Self::validate_content(content, attachment.as_ref()) {
            Ok(content) => content,
            Err(e) => {
                debug!("invalid room message from {}: {}", sender, e);
                return SendAck::rejected(AckCode::InvalidPayload, None);
            }
        };

        if !self.rate_limiter.allow(sender, EventKind::RoomMessage).await {
            return SendAck::rejected(AckCode::RateLimited, None);
        }

        let candidate = MessageRecord::room(sender, room, content.clone(), attachment);
        let fp = fingerprint(
            sender,
            &candidate.target.key(),
            &content,
            candidate.created_at.timestamp_millis(),
        );

        let outcome = match self
            .dedup
            .create_if_absent(&fp, self.messages.as_ref(), candidate)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("persist failed for room message from {}: {}", sender, e);
                return SendAck::rejected(AckCode::PersistFailed, None);
            }
        };

        if !outcome.is_duplicate {
            let record = &outcome.record;
            let event = ServerEvent::RoomMessage {
                record_id: record.id.clone(),
                room: room.to_string(),
                sender_id: sender.to_string(),
                sender_name: self.registry.display_name(sender).await,
                content: record.content.clone(),
                attachment: record.attachment.clone(),
                timestamp: record.created_at,
            };
            let reached = self
                .registry
                .broadcast_to_room(room, &event, Some(origin_conn));
            debug!(
                "room message {} reached {} connections in {}",
                record.id, reached, room
            );
        }

        SendAck::delivered(outcome.record.id.clone(), outcome.is_duplicate, None)
    }

    /// Typing indicator: fire-and-forget. Over-limit or malformed
    /// indicators are dropped silently, never acked.
    pub async fn typing(
        &self,
        sender: &str,
        origin_conn: &str,
        room: Option<String>,
        recipient_id: Option<String>,
        is_typing: bool,
    ) {
        // Addressed to exactly one of room / recipient
        if room.is_some() == recipient_id.is_some() {
            debug!("dropping ambiguous typing indicator from {}", sender);
            return;
        }

        if !self.rate_limiter.allow(sender, EventKind::Typing).await {
            return;
        }

        let event = ServerEvent::Typing {
            sender_id: sender.to_string(),
            room: room.clone(),
            is_typing,
        };

        if let Some(room) = room {
            self.registry
                .broadcast_to_room(&room, &event, Some(origin_conn));
        } else if let Some(recipient) = recipient_id {
            self.registry.send_to_identity(&recipient, &event);
        }
    }
}

// Shared reference to the relay service
pub type SharedRealtimeServer = Arc<RealtimeServer>;
