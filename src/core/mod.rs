//! Core functionality for the relay

pub mod connection;
pub mod dedup;
pub mod event_handler;
pub mod fanout;
pub mod message_types;
pub mod rate_limit;
pub mod registry;
pub mod server;

// Re-export main components for convenience
pub use connection::Connection;
pub use dedup::{DedupCache, DedupStore, MemoryDedupStore, RedisDedupStore};
pub use event_handler::EventRouter;
pub use fanout::{NotificationKind, Notifier};
pub use message_types::{ClientEvent, SendAck, ServerEvent};
pub use rate_limit::{EventKind, MemoryRateLimitStore, RateLimiter, RateLimitStore, RedisRateLimitStore};
pub use registry::ConnectionRegistry;
pub use server::{RealtimeServer, SharedRealtimeServer};
