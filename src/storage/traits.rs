//! Abstract collaborator interfaces for pluggable backends
//!
//! Defines the seams to the document store, the user directory, and the
//! external push transport.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::user::UserProfile;
use crate::error::Result;

/// Where a delivered record is addressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum DeliveryTarget {
    Identity(String),
    Room(String),
}

impl DeliveryTarget {
    /// Stable key used for fingerprinting and rate scoping
    pub fn key(&self) -> String {
        match self {
            DeliveryTarget::Identity(id) => id.clone(),
            DeliveryTarget::Room(room) => format!("room:{}", room),
        }
    }
}

/// A delivered message as owned by the document store. The relay only
/// creates-if-absent and reads records back on duplicate detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub sender_id: String,
    pub target: DeliveryTarget,
    pub content: String,
    pub attachment: Option<String>,
    /// Client-supplied token used to reconcile optimistic UI
    pub correlation_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn direct(
        sender_id: &str,
        recipient_id: &str,
        content: String,
        attachment: Option<String>,
        correlation_token: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            target: DeliveryTarget::Identity(recipient_id.to_string()),
            content,
            attachment,
            correlation_token,
            created_at: Utc::now(),
        }
    }

    pub fn room(
        sender_id: &str,
        room: &str,
        content: String,
        attachment: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            target: DeliveryTarget::Room(room.to_string()),
            content,
            attachment,
            correlation_token: None,
            created_at: Utc::now(),
        }
    }
}

/// A persisted notification. `count` is pinned at 1: notification
/// batching is disallowed by platform policy and must not come back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub kind: String,
    pub message: String,
    pub link: String,
    pub count: u32,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn new(
        recipient_id: String,
        sender_id: String,
        kind: &str,
        message: String,
        link: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recipient_id,
            sender_id,
            kind: kind.to_string(),
            message,
            link,
            count: 1,
            created_at: Utc::now(),
        }
    }
}

/// Document-store interface for delivered records
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new record, returning it as stored
    async fn create(&self, record: MessageRecord) -> Result<MessageRecord>;

    /// Read a record back by id
    async fn find_by_id(&self, id: &str) -> Result<Option<MessageRecord>>;
}

/// User directory lookup interface
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve profiles for the given identities; unknown ids are omitted
    async fn find(&self, ids: &[String]) -> Result<Vec<UserProfile>>;
}

/// Notification record persistence interface
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, record: NotificationRecord) -> Result<NotificationRecord>;
}

/// Payload handed to the external push transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub link: String,
}

/// Outcome of a push attempt. The sink never errors; failures come back
/// as `success = false` with a reason.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

impl PushOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Fire-and-forget external push sink (Web Push, FCM, ...)
#[async_trait]
pub trait PushSink: Send + Sync {
    async fn send(&self, identity: &str, payload: PushPayload) -> PushOutcome;
}
