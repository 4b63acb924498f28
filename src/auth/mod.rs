//! Authentication and role checks.
//!
//! Clients authenticate with `Authorization: Bearer <token>`. Tokens are
//! random 256-bit values handed out at login; the store only ever sees their
//! SHA-256 digest.

pub mod password;
pub mod rate_limit;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::api::AppState;
use crate::domain::aggregates::{Role, Session, User};
use crate::store::Store;
use crate::{EcommerceError, Result};

pub use rate_limit::RateLimiter;

pub fn hash_token(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

/// Creates a session for `user_id` and returns the token to hand to the client.
pub async fn issue_session(store: &dyn Store, user_id: uuid::Uuid, ttl: Duration) -> Result<String> {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let token = URL_SAFE_NO_PAD.encode(raw);
    let now = Utc::now();
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| EcommerceError::Validation(e.to_string()))?;
    store.create_session(Session { token_hash: hash_token(&token), user_id, created_at: now, expires_at: now + ttl }).await?;
    Ok(token)
}

pub async fn authenticate(store: &dyn Store, token: &str) -> Result<AuthUser> {
    let token_hash = hash_token(token);
    let session = store.find_session(&token_hash).await?.ok_or(EcommerceError::Unauthenticated)?;
    if session.is_expired(Utc::now()) {
        store.delete_session(&token_hash).await?;
        return Err(EcommerceError::Unauthenticated);
    }
    let user = store.find_user(session.user_id).await?.ok_or(EcommerceError::Unauthenticated)?;
    Ok(AuthUser { user, token_hash })
}

/// The signed-in user behind the request.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user: User,
    pub token_hash: String,
}

impl AuthUser {
    pub fn id(&self) -> uuid::Uuid { self.user.id }
    pub fn role(&self) -> Role { self.user.role }

    pub fn require(&self, role: Role) -> Result<()> {
        if self.user.role != role { return Err(EcommerceError::Forbidden); }
        Ok(())
    }

    pub fn require_staff(&self) -> Result<()> {
        if !self.user.role.is_staff() { return Err(EcommerceError::Forbidden); }
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let state = AppState::from_ref(state);
        let token = bearer_token(&parts.headers).ok_or(EcommerceError::Unauthenticated)?;
        authenticate(state.store.as_ref(), token).await
    }
}
