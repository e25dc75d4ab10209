//! Transport-facing handlers

pub mod websocket;

// Re-export the websocket entry points
pub use websocket::{handle_ws_client, relay_routes};
