//! Server configuration module
//! Handles dynamic configuration parameters for the relay

use crate::constants::{DEFAULT_HOST, DEFAULT_PORT, PROFILE_SWEEP_SECS, STORE_SWEEP_SECS};
use crate::error::{RelayError, Result};
use std::env;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JWT secret used to validate connection tokens
    pub jwt_secret: String,
    /// Shared counter backend (Redis). None selects the process-local
    /// rate-limit/dedup stores.
    pub redis_url: Option<String>,
    /// Sweep cadence for the local rate-limit and dedup stores
    pub store_sweep_interval: Duration,
    /// Sweep cadence for the registry profile cache
    pub profile_sweep_interval: Duration,
}

impl ServerConfig {
    /// Create a test configuration - only for tests, never production
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: "test-jwt-5ecret-0nly-for-unit-te5ts-never-production".to_string(),
            redis_url: None,
            store_sweep_interval: Duration::from_secs(STORE_SWEEP_SECS),
            profile_sweep_interval: Duration::from_secs(PROFILE_SWEEP_SECS),
        }
    }

    /// Validate that the JWT secret meets minimum requirements
    fn validate_jwt_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(RelayError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        let insecure_patterns = ["your-secret-key", "change-this", "default", "password", "12345"];
        for pattern in &insecure_patterns {
            if secret.contains(pattern) {
                return Err(RelayError::ConfigError(format!(
                    "JWT secret contains insecure pattern '{}'. Generate one with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("PULSE_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("PULSE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let jwt_secret = env::var("PULSE_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                RelayError::ConfigError(
                    "JWT_SECRET environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;

        Self::validate_jwt_secret(&jwt_secret)?;

        // Absence of the shared backend is a supported deployment mode,
        // handled at startup with a logged warning, never a crash.
        let redis_url = env::var("PULSE_REDIS_URL").ok().filter(|u| !u.is_empty());

        let store_sweep = env::var("PULSE_STORE_SWEEP_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(STORE_SWEEP_SECS);

        let profile_sweep = env::var("PULSE_PROFILE_SWEEP_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(PROFILE_SWEEP_SECS);

        Ok(Self {
            host,
            port,
            jwt_secret,
            redis_url,
            store_sweep_interval: Duration::from_secs(store_sweep),
            profile_sweep_interval: Duration::from_secs(profile_sweep),
        })
    }
}
