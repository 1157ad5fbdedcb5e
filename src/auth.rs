use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::schemas::{AppState, ErrorResponse};

/// Claims stored in a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id (subject)
    pub sub: String,
    /// Username
    pub username: String,
    /// Admin flag, checked by the role policy
    pub is_admin: bool,
    /// Token id, used for logout revocation
    pub jti: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued-at timestamp
    pub iat: i64,
}

/// Signing and verification keys for session tokens, plus their lifetime.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_minutes: i64,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes,
        }
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    /// Issue a session token for an authenticated user.
    pub fn issue(&self, user: &model::entities::user::Model) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            jti: Uuid::new_v4().to_string(),
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Validate a session token and return its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

/// Hash a password with argon2 and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(password_hash.to_string())
}

/// Verify a password against a stored argon2 hash.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, argon2::password_hash::Error> {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };

    let parsed_hash = PasswordHash::new(stored_hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// The authenticated user behind the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    /// Token id the session was presented with; revoked on logout.
    pub jti: String,
}

fn unauthorized() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Authentication required".to_string(),
            code: "UNAUTHORIZED".to_string(),
            success: false,
        }),
    )
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(unauthorized)?;

        let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
            warn!("Authorization header without bearer scheme");
            unauthorized()
        })?;

        let claims = state.sessions.validate(token).map_err(|e| {
            debug!("Session token rejected: {}", e);
            unauthorized()
        })?;

        // Logged-out tokens stay invalid until they would have expired anyway
        if state.revoked_sessions.contains_key(&claims.jti) {
            debug!("Session token {} was revoked by logout", claims.jti);
            return Err(unauthorized());
        }

        let id = claims.sub.parse::<i32>().map_err(|_| unauthorized())?;

        Ok(CurrentUser {
            id,
            username: claims.username,
            is_admin: claims.is_admin,
            jti: claims.jti,
        })
    }
}

/// The single role policy for admin-gated operations. Handlers call this
/// instead of checking the flag themselves so the rule lives in one place.
pub fn require_admin(user: &CurrentUser) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if user.is_admin {
        return Ok(());
    }
    warn!("User '{}' denied access to an admin operation", user.username);
    Err((
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "Access denied".to_string(),
            code: "FORBIDDEN".to_string(),
            success: false,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }

    #[test]
    fn token_round_trip_carries_identity() {
        let keys = SessionKeys::new("test-secret", 60);
        let user = model::entities::user::Model {
            id: 42,
            username: "alice".to_string(),
            password_hash: "irrelevant".to_string(),
            is_admin: true,
        };

        let token = keys.issue(&user).unwrap();
        let claims = keys.validate(&token).unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.username, "alice");
        assert!(claims.is_admin);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let keys = SessionKeys::new("test-secret", 60);
        let other = SessionKeys::new("other-secret", 60);
        let user = model::entities::user::Model {
            id: 1,
            username: "bob".to_string(),
            password_hash: "irrelevant".to_string(),
            is_admin: false,
        };

        let token = keys.issue(&user).unwrap();
        assert!(other.validate(&token).is_err());
    }
}
