//! Bearer token authentication.
//!
//! Tokens are `base64url(claims) "." base64url(hmac_sha256(claims))`, where the
//! claims carry the user id, an expiry and a unique token id (`jti`). Logging
//! out puts the `jti` on a [`TokenDenylist`] until the token would have expired
//! anyway.
//!
//! Handlers opt in with the [`CurrentUser`] and [`AdminUser`] extractors:
//!
//! ```rust,ignore
//! async fn handler(user: CurrentUser) -> impl IntoResponse {
//!     format!("Hello, {}!", user.user.name)
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use common::UserId;
use domain::User;
use hmac::{Hmac, Mac};
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use services::Actor;
use sha2::Sha256;
use store::{Store, UserStore};
use thiserror::Error;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    /// Expiry as a Unix timestamp in seconds.
    pub exp: i64,
    pub jti: String,
}

/// Issues and verifies HMAC-SHA256 signed bearer tokens.
pub struct TokenIssuer {
    secret: SecretString,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: SecretString, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    pub fn issue(&self, user_id: UserId) -> Result<String, TokenError> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id,
            exp: Utc::now().timestamp().saturating_add(ttl),
            jti: Uuid::new_v4().simple().to_string(),
        };
        let payload = serde_json::to_vec(&claims).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let encoded = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{encoded}.{signature}"))
    }

    /// Checks the signature in constant time, then the expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let (encoded, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

/// Token ids revoked by logout, forgotten once the token could no longer verify.
///
/// Entries only leave by expiry. Evicting one early would re-admit a
/// logged-out token, so the cache has no size bound.
#[derive(Clone)]
pub struct TokenDenylist {
    revoked: Cache<String, ()>,
}

impl TokenDenylist {
    pub fn new(ttl: Duration) -> Self {
        Self {
            revoked: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub async fn revoke(&self, jti: &str) {
        self.revoked.insert(jti.to_string(), ()).await;
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }
}

/// The authenticated caller, loaded fresh from the store on every request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub claims: Claims,
}

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user.id, self.user.role)
    }
}

/// An authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl AdminUser {
    pub fn actor(&self) -> Actor {
        self.0.actor()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        if state.denylist.is_revoked(&claims.jti) {
            return Err(ApiError::Unauthorized("Token has been revoked".to_string()));
        }

        let user = state
            .store
            .get_user(claims.sub)
            .await
            .map_err(|e| ApiError::Service(e.into()))?
            .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

        Ok(Self { user, claims })
    }
}

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if !current.user.role.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(current))
    }
}
