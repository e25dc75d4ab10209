//! Wire types for client/server communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AckCode;

/// Client-to-server event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Join a broadcast room
    #[serde(rename = "join_room")]
    JoinRoom { room: String },

    /// Leave a broadcast room
    #[serde(rename = "leave_room")]
    LeaveRoom { room: String },

    /// Send a direct message to another user
    #[serde(rename = "direct_message")]
    DirectMessage {
        recipient_id: String,
        content: String,
        attachment: Option<String>,
        correlation_token: Option<String>,
    },

    /// Send a message to a room
    #[serde(rename = "room_message")]
    RoomMessage {
        room: String,
        content: String,
        attachment: Option<String>,
    },

    /// Typing indicator, addressed to a room or a user (fire-and-forget)
    #[serde(rename = "typing")]
    Typing {
        room: Option<String>,
        recipient_id: Option<String>,
        is_typing: bool,
    },
}

/// One-time response to a send attempt. Every send handler produces
/// exactly one of these on every code path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAck {
    pub success: bool,
    pub record_id: Option<String>,
    pub duplicate: bool,
    pub correlation_token: Option<String>,
    pub code: Option<String>,
}

impl SendAck {
    /// Successful delivery; `duplicate` marks an absorbed retry
    pub fn delivered(record_id: String, duplicate: bool, correlation_token: Option<String>) -> Self {
        Self {
            success: true,
            record_id: Some(record_id),
            duplicate,
            correlation_token,
            code: None,
        }
    }

    /// Structured rejection with a non-leaking code
    pub fn rejected(code: AckCode, correlation_token: Option<String>) -> Self {
        Self {
            success: false,
            record_id: None,
            duplicate: false,
            correlation_token,
            code: Some(code.as_str().to_string()),
        }
    }
}

/// Server-to-client event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Connection accepted and registered
    #[serde(rename = "connected")]
    Connected {
        identity: String,
        session_id: String,
    },

    /// Acknowledgment of a send attempt
    #[serde(rename = "ack")]
    Ack(SendAck),

    /// Direct message delivery
    #[serde(rename = "direct_message")]
    DirectMessage {
        record_id: String,
        sender_id: String,
        sender_name: String,
        content: String,
        attachment: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Room message delivery
    #[serde(rename = "room_message")]
    RoomMessage {
        record_id: String,
        room: String,
        sender_id: String,
        sender_name: String,
        content: String,
        attachment: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Typing indicator from another user
    #[serde(rename = "typing")]
    Typing {
        sender_id: String,
        room: Option<String>,
        is_typing: bool,
    },

    /// Presence transition of a peer
    #[serde(rename = "presence")]
    Presence { identity: String, online: bool },

    /// Real-time notification
    #[serde(rename = "notification")]
    Notification {
        sender_id: String,
        kind: String,
        message: String,
        link: String,
        count: u32,
    },

    /// Error event
    #[serde(rename = "error")]
    Error { code: String, message: String },
}
