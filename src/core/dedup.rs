//! Idempotent message creation
//!
//! Clients retry sends after ack timeouts; a fingerprint over (sender,
//! target, normalized content, time bucket) collapses those retries to
//! one persisted record. The fingerprint is registered only after the
//! persist succeeds, so a failed send is never treated as delivered.

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, warn};
use redis::aio::MultiplexedConnection;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::constants::{DEDUP_TTL_SECS, FINGERPRINT_BUCKET_MS};
use crate::error::Result;
use crate::storage::traits::{MessageRecord, MessageStore};

/// Collapse whitespace runs so trivially reformatted retries match
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic fingerprint for a send attempt. `at_ms` is rounded
/// down to the bucket width, so near-simultaneous retries collide.
pub fn fingerprint(sender: &str, target_key: &str, content: &str, at_ms: i64) -> String {
    let bucket = at_ms.div_euclid(FINGERPRINT_BUCKET_MS);

    let mut hasher = Sha256::new();
    hasher.update(sender.as_bytes());
    hasher.update(b"\n");
    hasher.update(target_key.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_content(content).as_bytes());
    hasher.update(b"\n");
    hasher.update(bucket.to_be_bytes());

    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Backend-agnostic fingerprint -> record-id store
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>>;
    async fn put(&self, fingerprint: &str, record_id: &str, ttl: Duration) -> Result<()>;
}

/// Process-local store with TTL eviction by periodic sweep
#[derive(Default)]
pub struct MemoryDedupStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired fingerprints
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    pub fn start_sweeper(self: Arc<Self>, period: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.sweep();
            }
        });
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>> {
        Ok(self.entries.get(fingerprint).and_then(|entry| {
            let (record_id, expires_at) = entry.value();
            if *expires_at > Instant::now() {
                Some(record_id.clone())
            } else {
                None
            }
        }))
    }

    async fn put(&self, fingerprint: &str, record_id: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            fingerprint.to_string(),
            (record_id.to_string(), Instant::now() + ttl),
        );
        Ok(())
    }
}

/// Shared store: plain GET / SET PX, expiry handled by the backend
pub struct RedisDedupStore {
    conn: MultiplexedConnection,
}

impl RedisDedupStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(format!("dd:{}", fingerprint))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn put(&self, fingerprint: &str, record_id: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(format!("dd:{}", fingerprint))
            .arg(record_id)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Result of an idempotent create
pub struct DedupOutcome {
    pub record: MessageRecord,
    pub is_duplicate: bool,
}

/// Idempotent creation front for the document store. Checks for a single
/// fingerprint are linearized by a per-fingerprint mutex, so two
/// concurrent identical sends cannot both persist.
pub struct DedupCache {
    store: Arc<dyn DedupStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
    degraded: AtomicBool,
}

impl DedupCache {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self::with_ttl(store, Duration::from_secs(DEDUP_TTL_SECS))
    }

    pub fn with_ttl(store: Arc<dyn DedupStore>, ttl: Duration) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            ttl,
            degraded: AtomicBool::new(false),
        }
    }

    /// Create the candidate record unless a live fingerprint already
    /// maps to a delivered one. On a hit the previous record is read
    /// back and the store's `create` is never invoked.
    pub async fn create_if_absent(
        &self,
        fp: &str,
        messages: &dyn MessageStore,
        candidate: MessageRecord,
    ) -> Result<DedupOutcome> {
        let lock = self
            .locks
            .entry(fp.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.create_locked(fp, messages, candidate).await
        };

        drop(lock);
        self.locks.remove_if(fp, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn create_locked(
        &self,
        fp: &str,
        messages: &dyn MessageStore,
        candidate: MessageRecord,
    ) -> Result<DedupOutcome> {
        if let Some(record_id) = self.lookup(fp).await {
            match messages.find_by_id(&record_id).await? {
                Some(record) => {
                    debug!("absorbed duplicate send, record {}", record.id);
                    return Ok(DedupOutcome {
                        record,
                        is_duplicate: true,
                    });
                }
                // Fingerprint outlived the record; recreate below
                None => debug!("fingerprint points at purged record {}", record_id),
            }
        }

        let record = messages.create(candidate).await?;
        if let Err(e) = self.store.put(fp, &record.id, self.ttl).await {
            // The record is persisted; a lost fingerprint only weakens
            // retry absorption for this bucket
            warn!("dedup store put failed: {}", e);
        }
        Ok(DedupOutcome {
            record,
            is_duplicate: false,
        })
    }

    /// Fingerprint lookup; store failures fail open (non-duplicate)
    async fn lookup(&self, fp: &str) -> Option<String> {
        match self.store.get(fp).await {
            Ok(found) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    info!("dedup backend recovered");
                }
                found
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!("dedup backend unavailable, failing open: {}", e);
                } else {
                    debug!("dedup backend still unavailable: {}", e);
                }
                None
            }
        }
    }
}
