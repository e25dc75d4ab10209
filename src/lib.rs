//! Pulse Relay - the real-time delivery core of the Pulse platform
//!
//! Accepts WebSocket connections, tracks who is online, and delivers
//! direct and room messages exactly once under client retries.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod storage;

// Re-export main components
pub use config::*;
pub use constants::*;
