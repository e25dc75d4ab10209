//! Sliding-window admission control, per (identity, event kind)
//!
//! One store interface, two backends with identical semantics: a Redis
//! sorted-set pipeline shared across processes, or a process-local map.
//! The limiter itself never errors: a failing backend fails open so an
//! infrastructure outage cannot take the messaging path down with it.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use redis::aio::MultiplexedConnection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::constants::{
    DIRECT_MESSAGE_MAX, DIRECT_MESSAGE_WINDOW_MS, ROOM_MESSAGE_MAX, ROOM_MESSAGE_WINDOW_MS,
    TYPING_MAX, TYPING_WINDOW_MS,
};
use crate::error::Result;

/// Inbound event kinds subject to admission control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    DirectMessage,
    RoomMessage,
    Typing,
    JoinRoom,
    LeaveRoom,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DirectMessage => "direct_message",
            EventKind::RoomMessage => "room_message",
            EventKind::Typing => "typing",
            EventKind::JoinRoom => "join_room",
            EventKind::LeaveRoom => "leave_room",
        }
    }

    /// Static per-event configuration. Kinds without an entry are
    /// always admitted.
    pub fn limit(&self) -> Option<RateLimit> {
        match self {
            EventKind::DirectMessage => Some(RateLimit {
                max: DIRECT_MESSAGE_MAX,
                window_ms: DIRECT_MESSAGE_WINDOW_MS,
            }),
            EventKind::RoomMessage => Some(RateLimit {
                max: ROOM_MESSAGE_MAX,
                window_ms: ROOM_MESSAGE_WINDOW_MS,
            }),
            EventKind::Typing => Some(RateLimit {
                max: TYPING_MAX,
                window_ms: TYPING_WINDOW_MS,
            }),
            EventKind::JoinRoom | EventKind::LeaveRoom => None,
        }
    }
}

/// A max/window pair for one event kind
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max: u32,
    pub window_ms: u64,
}

/// Widest configured window; local keys idle past this are dead
fn largest_window_ms() -> u64 {
    DIRECT_MESSAGE_WINDOW_MS
        .max(ROOM_MESSAGE_WINDOW_MS)
        .max(TYPING_WINDOW_MS)
}

/// Backend-agnostic counter store. `hit` records the event and decides
/// admission in one linearized step per key.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, key: &str, limit: RateLimit) -> Result<bool>;
}

/// Process-local store: timestamps per key, filtered lazily on each
/// check. The DashMap entry guard linearizes concurrent hits on a key.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    hits: DashMap<String, Vec<Instant>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop keys whose newest timestamp fell out of every window
    pub fn sweep(&self) {
        let horizon = Duration::from_millis(largest_window_ms());
        let now = Instant::now();
        self.hits
            .retain(|_, stamps| stamps.last().is_some_and(|t| now.duration_since(*t) < horizon));
    }

    /// Spawn the periodic sweep, bounding memory growth
    pub fn start_sweeper(self: Arc<Self>, period: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.sweep();
            }
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.hits.len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, key: &str, limit: RateLimit) -> Result<bool> {
        let now = Instant::now();
        let window = Duration::from_millis(limit.window_ms);

        let mut stamps = self.hits.entry(key.to_string()).or_default();
        stamps.retain(|t| now.duration_since(*t) < window);
        if stamps.len() >= limit.max as usize {
            return Ok(false);
        }
        stamps.push(now);
        Ok(true)
    }
}

/// Shared store: per-key sorted set of timestamps, mutated by one
/// atomic pipeline so concurrent processes agree on the count.
pub struct RedisRateLimitStore {
    conn: MultiplexedConnection,
}

impl RedisRateLimitStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, limit: RateLimit) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = format!("rl:{}", key);
        let now_ms = Utc::now().timestamp_millis();
        let window_start = now_ms - limit.window_ms as i64;
        // Unique member so same-millisecond events don't collapse
        let member = format!("{}-{}", now_ms, Uuid::new_v4());

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(window_start)
            .ignore();
        pipe.cmd("ZADD").arg(&key).arg(now_ms).arg(&member).ignore();
        pipe.cmd("ZCARD").arg(&key);
        pipe.cmd("PEXPIRE").arg(&key).arg(limit.window_ms).ignore();

        let (count,): (i64,) = pipe.query_async(&mut conn).await?;
        Ok(count <= limit.max as i64)
    }
}

/// The admission decision service. Pure yes/no; never errors.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    degraded: AtomicBool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store,
            degraded: AtomicBool::new(false),
        }
    }

    /// Check whether an event from this identity is admitted. Backend
    /// failures fail open, warning once per outage rather than once per
    /// request.
    pub async fn allow(&self, identity: &str, kind: EventKind) -> bool {
        let Some(limit) = kind.limit() else {
            return true;
        };
        let key = format!("{}|{}", identity, kind.as_str());

        match self.store.hit(&key, limit).await {
            Ok(allowed) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    info!("rate-limit backend recovered");
                }
                allowed
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!("rate-limit backend unavailable, failing open: {}", e);
                } else {
                    debug!("rate-limit backend still unavailable: {}", e);
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;

    const TIGHT: RateLimit = RateLimit {
        max: 3,
        window_ms: 100,
    };

    #[tokio::test]
    async fn test_window_admits_up_to_max() {
        let store = MemoryRateLimitStore::new();
        for _ in 0..3 {
            assert!(store.hit("alice|direct_message", TIGHT).await.unwrap());
        }
        assert!(!store.hit("alice|direct_message", TIGHT).await.unwrap());

        // Other keys are unaffected
        assert!(store.hit("bob|direct_message", TIGHT).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let store = MemoryRateLimitStore::new();
        for _ in 0..3 {
            assert!(store.hit("alice|typing", TIGHT).await.unwrap());
        }
        assert!(!store.hit("alice|typing", TIGHT).await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.hit("alice|typing", TIGHT).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_keys() {
        let store = MemoryRateLimitStore::new();
        store.hit("alice|typing", TIGHT).await.unwrap();
        assert_eq!(store.tracked_keys(), 1);

        // Newest stamp is inside the largest window, so the key survives
        store.sweep();
        assert_eq!(store.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_kind_always_admitted() {
        let limiter = RateLimiter::new(Arc::new(MemoryRateLimitStore::new()));
        for _ in 0..1000 {
            assert!(limiter.allow("alice", EventKind::JoinRoom).await);
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn hit(&self, _key: &str, _limit: RateLimit) -> Result<bool> {
            Err(RelayError::BackendError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_backend_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        for _ in 0..10 {
            assert!(limiter.allow("alice", EventKind::DirectMessage).await);
        }
    }
}
