//! Authentication module
//!
//! Session issuance lives outside this core; we only consume a decoded
//! identity and session id from the connection token.

pub mod token;
pub mod user;

// Re-export main components
pub use token::{AuthContext, Claims, TokenManager};
pub use user::{UserProfile, UserRole};
