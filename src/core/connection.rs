//! WebSocket connection handle
//! One identity may hold several of these at once (multi-device)

use log::warn;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::Message;

use crate::core::message_types::ServerEvent;

/// Represents the state of a single client connection
pub struct Connection {
    pub id: String,
    pub session_id: String,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: Instant,
}

impl Connection {
    /// Create a new connection with a unique ID
    pub fn new(session_id: String, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Send a text frame through this connection
    pub fn send_text(&self, text: &str) -> bool {
        match self.sender.send(Message::text(text)) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to send frame to connection {}", self.id);
                false
            }
        }
    }

    /// Serialize and send a server event through this connection
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(text) => self.send_text(&text),
            Err(e) => {
                warn!("Failed to serialize event for {}: {}", self.id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_receiver_drop_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new("sess-1".to_string(), tx);
        drop(rx);
        assert!(!conn.send_text("hello"));
    }
}
