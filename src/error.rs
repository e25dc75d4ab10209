use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RelayError {
    // Session errors
    SessionNotFound(String),
    ConnectionClosed,

    // Room errors
    RoomNotFound(String),

    // Validation errors
    ValidationError(String),
    MessageTooLarge(usize),

    // Collaborator errors
    StorageError(String),
    BackendError(String),

    // Auth errors
    AuthError(String),

    // Messages errors
    MessageParseError(String),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::RoomNotFound(room) => write!(f, "Room not found: {}", room),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::MessageTooLarge(size) => write!(f, "Message too large: {} bytes", size),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Self::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RelayError {}

impl From<redis::RedisError> for RelayError {
    fn from(err: redis::RedisError) -> Self {
        RelayError::BackendError(err.to_string())
    }
}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, RelayError>;

/// Error codes surfaced to clients in acknowledgments. Internal error
/// detail never crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    InvalidPayload,
    RateLimited,
    PersistFailed,
}

impl AckCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckCode::InvalidPayload => "invalid_payload",
            AckCode::RateLimited => "rate_limited",
            AckCode::PersistFailed => "persist_failed",
        }
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
