//! JWT-based authentication module.
//!
//! Session tokens are HS256 JWTs carrying the user's identity and admin flag.
//! The OAuth `state` round-trip uses constant-time comparison to mitigate
//! timing attacks.

pub mod oauth;

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::models::User;

/// Cookie carrying the OAuth `state` between login and callback.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Claims embedded in a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys for session tokens.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issue a token for `user`.
    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            is_admin: user.is_admin,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify a token's signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }
}

/// The authenticated caller, as asserted by their token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub is_admin: bool,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            is_admin: claims.is_admin,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// An authenticated caller with the admin flag set.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// JWT authentication layer function that takes the verification keys as a parameter.
///
/// On success the caller is stored in the request extensions as [`AuthUser`].
pub async fn jwt_auth_layer(keys: Arc<JwtKeys>, mut request: Request, next: Next) -> Response {
    let token = match bearer_token(&request) {
        Some(token) => token,
        None => {
            return AppError::Unauthorized("Missing or invalid authorization header".to_string())
                .into_response()
        }
    };

    match keys.verify(token) {
        Ok(claims) => {
            request.extensions_mut().insert(AuthUser::from(claims));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read a cookie value from the request headers.
pub fn cookie_value<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Perform constant-time string comparison.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    // Constant-time comparison
    a_bytes.ct_eq(b_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn user(is_admin: bool) -> User {
        User {
            id: "user-1".to_string(),
            email: "test@example.com".to_string(),
            display_name: "Test User".to_string(),
            avatar_url: None,
            is_admin,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let keys = JwtKeys::new("secret", 24);
        let token = keys.issue(&user(true)).unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.id, "user-1");
        assert_eq!(claims.display_name, "Test User");
        assert!(claims.is_admin);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_auth_user_from_claims() {
        let keys = JwtKeys::new("secret", 24);
        let token = keys.issue(&user(true)).unwrap();

        let auth = AuthUser::from(keys.verify(&token).unwrap());
        assert_eq!(auth.id, "user-1");
        assert!(auth.is_admin);
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let token = JwtKeys::new("secret", 24).issue(&user(false)).unwrap();
        let err = JwtKeys::new("other", 24).verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert_eq!(err.message(), "Invalid token");
    }

    #[test]
    fn test_rejects_expired_token() {
        let keys = JwtKeys::new("secret", 24);
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims {
            id: "user-1".to_string(),
            email: "test@example.com".to_string(),
            display_name: "Test".to_string(),
            is_admin: false,
            iat: (past - Duration::hours(1)).timestamp(),
            exp: past.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();

        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        let keys = JwtKeys::new("secret", 24);
        assert!(keys.verify("invalid-token").is_err());
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; oauth_state=abc123; other=1"),
        );
        assert_eq!(cookie_value(&headers, OAUTH_STATE_COOKIE), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("state-123", "state-123"));
        assert!(!constant_time_compare("state-123", "state-124"));
        assert!(!constant_time_compare("short", "much-longer-state"));
        assert!(constant_time_compare("", ""));
    }
}
