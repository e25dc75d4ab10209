use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{RelayError, Result};

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identity)
    pub sub: String,
    /// Session id issued by the auth service
    pub sid: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    pub iat: usize,
}

impl Claims {
    /// Creates new claims for a user session
    pub fn new(identity: String, session_id: String) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_secs() as usize;

        Self {
            sub: identity,
            sid: session_id,
            exp: now + 86400, // 24 hours from now
            iat: now,
        }
    }
}

/// The identity a connection runs under once its token is accepted
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: String,
    pub session_id: String,
}

/// Validates connection tokens issued by the auth service
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenManager {
    /// Creates a new token manager with a shared secret
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Generates a JWT token for the given claims
    pub fn generate_token(&self, claims: &Claims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| RelayError::AuthError(format!("Failed to generate token: {}", e)))
    }

    /// Validates and decodes a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| RelayError::AuthError(format!("Invalid token: {}", e)))
    }

    /// Validates a connection token and returns the identity it carries
    pub fn authenticate(&self, token: Option<&str>) -> Result<AuthContext> {
        let token = token.ok_or_else(|| RelayError::AuthError("Missing token".to_string()))?;
        let claims = self.validate_token(token)?.claims;
        Ok(AuthContext {
            identity: claims.sub,
            session_id: claims.sid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let manager = TokenManager::new("test-secret-key");
        let claims = Claims::new("user123".to_string(), "sess-1".to_string());

        let token = manager.generate_token(&claims).unwrap();
        let auth = manager.authenticate(Some(&token)).unwrap();
        assert_eq!(auth.identity, "user123");
        assert_eq!(auth.session_id, "sess-1");
    }

    #[test]
    fn test_missing_or_garbage_token_rejected() {
        let manager = TokenManager::new("test-secret-key");
        assert!(manager.authenticate(None).is_err());
        assert!(manager.authenticate(Some("not-a-jwt")).is_err());
    }
}
