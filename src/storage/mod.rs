//! Collaborator interfaces consumed by the relay
//!
//! The document store, user directory, and push transport are external
//! systems; the relay talks to them through these traits only.

pub mod memory;
pub mod traits;

// Re-export main components
pub use memory::{InMemoryMessageStore, InMemoryNotificationStore, InMemoryUserDirectory, LogPushSink};
pub use traits::{
    DeliveryTarget, MessageRecord, MessageStore, NotificationRecord, NotificationStore,
    PushOutcome, PushPayload, PushSink, UserDirectory,
};
