//! Inbound event routing
//!
//! Parses frames from authenticated connections and dispatches them to
//! the relay service. Send attempts get exactly one ack back on the
//! originating connection, whatever path they take.

use log::{debug, warn};
use std::sync::Arc;

use crate::constants::MAX_FRAME_BYTES;
use crate::core::message_types::{ClientEvent, SendAck, ServerEvent};
use crate::core::server::RealtimeServer;

pub struct EventRouter {
    server: Arc<RealtimeServer>,
}

impl EventRouter {
    pub fn new(server: Arc<RealtimeServer>) -> Self {
        Self { server }
    }

    /// Process one inbound frame from a connection
    pub async fn handle(&self, identity: &str, conn_id: &str, frame: &str) {
        if frame.len() > MAX_FRAME_BYTES {
            warn!(
                "oversized frame from {} ({} bytes), rejecting",
                identity,
                frame.len()
            );
            self.send_error(identity, conn_id, "frame_too_large", "Frame exceeds size limit");
            return;
        }

        let event: ClientEvent = match serde_json::from_str(frame) {
            Ok(event) => event,
            Err(e) => {
                debug!("unparseable frame from {}: {}", identity, e);
                self.send_error(identity, conn_id, "malformed_event", "Could not parse event");
                return;
            }
        };

        match event {
            ClientEvent::JoinRoom { room } => {
                if let Err(e) = self.server.join_room(identity, conn_id, &room) {
                    debug!("{} failed to join {}: {}", identity, room, e);
                    self.send_error(identity, conn_id, "join_failed", "Could not join room");
                }
            }

            ClientEvent::LeaveRoom { room } => {
                if let Err(e) = self.server.leave_room(identity, conn_id, &room) {
                    debug!("{} failed to leave {}: {}", identity, room, e);
                    self.send_error(identity, conn_id, "leave_failed", "Could not leave room");
                }
            }

            ClientEvent::DirectMessage {
                recipient_id,
                content,
                attachment,
                correlation_token,
            } => {
                let ack = self
                    .server
                    .send_direct_message(identity, &recipient_id, &content, attachment, correlation_token)
                    .await;
                self.send_ack(identity, conn_id, ack);
            }

            ClientEvent::RoomMessage {
                room,
                content,
                attachment,
            } => {
                let ack = self
                    .server
                    .send_room_message(identity, conn_id, &room, &content, attachment)
                    .await;
                self.send_ack(identity, conn_id, ack);
            }

            ClientEvent::Typing {
                room,
                recipient_id,
                is_typing,
            } => {
                self.server
                    .typing(identity, conn_id, room, recipient_id, is_typing)
                    .await;
            }
        }
    }

    /// The one place acks leave the router
    fn send_ack(&self, identity: &str, conn_id: &str, ack: SendAck) {
        if !self
            .server
            .registry()
            .send_to_connection(identity, conn_id, &ServerEvent::Ack(ack))
        {
            debug!("ack for {} lost; connection {} already gone", identity, conn_id);
        }
    }

    fn send_error(&self, identity: &str, conn_id: &str, code: &str, message: &str) {
        let event = ServerEvent::Error {
            code: code.to_string(),
            message: message.to_string(),
        };
        self.server
            .registry()
            .send_to_connection(identity, conn_id, &event);
    }
}
