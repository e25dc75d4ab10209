//! In-memory collaborator implementations for development and testing
//!
//! Production deployments wire the relay to the platform's document store
//! and push gateway; these implementations keep everything in process.

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;

use crate::auth::user::UserProfile;
use crate::error::Result;
use crate::storage::traits::{
    MessageRecord, MessageStore, NotificationRecord, NotificationStore, PushOutcome, PushPayload,
    PushSink, UserDirectory,
};

/// In-memory message store keyed by record id
#[derive(Default)]
pub struct InMemoryMessageStore {
    records: DashMap<String, MessageRecord>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted records (test observability)
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, record: MessageRecord) -> Result<MessageRecord> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MessageRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }
}

/// In-memory user directory, seeded by tests or the dev binary
#[derive(Default)]
pub struct InMemoryUserDirectory {
    profiles: DashMap<String, UserProfile>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find(&self, ids: &[String]) -> Result<Vec<UserProfile>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|p| p.value().clone()))
            .collect())
    }
}

/// In-memory notification store keyed by record id
#[derive(Default)]
pub struct InMemoryNotificationStore {
    records: DashMap<String, NotificationRecord>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Notifications addressed to an identity (test observability)
    pub fn for_recipient(&self, identity: &str) -> Vec<NotificationRecord> {
        self.records
            .iter()
            .filter(|r| r.recipient_id == identity)
            .map(|r| r.value().clone())
            .collect()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, record: NotificationRecord) -> Result<NotificationRecord> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}

/// Push sink that only logs. Stands in for the Web Push/FCM gateway.
#[derive(Default)]
pub struct LogPushSink;

impl LogPushSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushSink for LogPushSink {
    async fn send(&self, identity: &str, payload: PushPayload) -> PushOutcome {
        debug!("push to {}: {}", identity, payload.title);
        PushOutcome::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_store_round_trip() {
        let store = InMemoryMessageStore::new();
        let record = MessageRecord::direct("alice", "bob", "hi".to_string(), None, None);
        let id = record.id.clone();

        store.create(record).await.unwrap();
        let found = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.sender_id, "alice");
        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_omits_unknown_ids() {
        let dir = InMemoryUserDirectory::new();
        dir.insert(UserProfile::new("alice".to_string(), "Alice".to_string()));

        let found = dir
            .find(&["alice".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_name, "Alice");
    }
}
