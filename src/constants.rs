// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4040;
pub const WS_PATH: &str = "ws";

// Every authenticated connection joins the shared lounge room
pub const LOUNGE_ROOM: &str = "lounge";

// Message validation limits
pub const MAX_CONTENT_LENGTH: usize = 2000;
pub const MAX_FRAME_BYTES: usize = 8 * 1024;

// Duplicate-send fingerprinting: retries inside the same bucket collapse
// to one delivered record. Tuned empirically, not a correctness bound.
pub const FINGERPRINT_BUCKET_MS: i64 = 5_000;
pub const DEDUP_TTL_SECS: u64 = 60;

// Read-through profile cache in the connection registry
pub const PROFILE_CACHE_TTL_SECS: u64 = 300;

// Background sweep cadence for the in-process stores
pub const STORE_SWEEP_SECS: u64 = 30;
pub const PROFILE_SWEEP_SECS: u64 = 300;

// Per-event sliding-window rate limits (max events per window).
// Event kinds without an entry here are always admitted.
pub const DIRECT_MESSAGE_MAX: u32 = 30;
pub const DIRECT_MESSAGE_WINDOW_MS: u64 = 60_000;
pub const ROOM_MESSAGE_MAX: u32 = 20;
pub const ROOM_MESSAGE_WINDOW_MS: u64 = 60_000;
pub const TYPING_MAX: u32 = 10;
pub const TYPING_WINDOW_MS: u64 = 10_000;
