//! Registration, login and profile management.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::password::{hash_password, validate_password_strength, validate_username, verify_password};
use crate::auth::{issue_session, AuthUser};
use crate::domain::aggregates::user::normalize_email;
use crate::domain::aggregates::{Role, SensitiveData, User};
use crate::services::cart::merge_session_cart;
use crate::{AppState, EcommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom = "validate_username")]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom = "validate_password_strength")]
    pub password: String,
    #[validate(length(max = 50))]
    pub first_name: Option<String>,
    #[validate(length(max = 50))]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// `None` leaves a field unchanged, an empty string clears it.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(max = 50))]
    pub first_name: Option<String>,
    #[validate(length(max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 500))]
    pub home_address: Option<String>,
    #[validate(length(max = 30))]
    pub phone_number: Option<String>,
    #[validate(length(max = 30))]
    pub tax_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(custom = "validate_password_strength")]
    pub new_password: String,
}

/// Account details with personal data decrypted for its owner.
#[derive(Debug, Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub home_address: Option<String>,
    pub phone_number: Option<String>,
    pub tax_id: Option<String>,
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<User> {
    req.validate()?;
    let email = normalize_email(&req.email);
    if !state.limiter.check(&format!("register:{email}")).await {
        return Err(EcommerceError::RateLimited);
    }
    let hash = hash_blocking(req.password).await?;
    let mut user = User::create(req.username.trim(), email, hash, Role::Customer);
    user.first_name = non_empty(req.first_name);
    user.last_name = non_empty(req.last_name);
    let user = state.store.create_user(user).await?;
    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// Signs a user in and moves the anonymous cart behind `session_key` into
/// their cart.
pub async fn login(state: &AppState, req: LoginRequest, session_key: Option<&str>) -> Result<LoginResponse> {
    req.validate()?;
    let email = normalize_email(&req.email);
    let limit_key = format!("login:{email}");
    if !state.limiter.check(&limit_key).await {
        tracing::warn!(email = %email, "login rate limit exceeded");
        return Err(EcommerceError::RateLimited);
    }
    let user = state.store.find_user_by_email(&email).await?.ok_or(EcommerceError::InvalidCredentials)?;
    if !verify_blocking(req.password, user.password_hash.clone()).await? {
        return Err(EcommerceError::InvalidCredentials);
    }
    state.limiter.reset(&limit_key).await;

    match state.store.purge_expired_sessions(Utc::now()).await {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "expired sessions purged"),
        Err(e) => tracing::warn!(error = %e, "expired session purge failed"),
    }
    let token = issue_session(state.store.as_ref(), user.id, state.config.session_ttl).await?;
    if let Some(key) = session_key {
        if let Err(e) = merge_session_cart(state, key, user.id).await {
            tracing::warn!(user_id = %user.id, error = %e, "session cart merge failed");
        }
    }
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(LoginResponse { token, user })
}

pub async fn logout(state: &AppState, auth: &AuthUser) -> Result<()> {
    state.store.delete_session(&auth.token_hash).await
}

pub async fn profile(state: &AppState, user: User) -> Result<Profile> {
    let data = state.store.sensitive_data(user.id).await?.unwrap_or_default();
    Ok(Profile {
        home_address: state.cipher.decrypt_opt(data.home_address.as_deref())?,
        phone_number: state.cipher.decrypt_opt(data.phone_number.as_deref())?,
        tax_id: state.cipher.decrypt_opt(data.tax_id.as_deref())?,
        user,
    })
}

pub async fn update_profile(state: &AppState, auth: &AuthUser, update: ProfileUpdate) -> Result<Profile> {
    update.validate()?;
    let mut user = auth.user.clone();
    if let Some(first) = update.first_name { user.first_name = non_empty(Some(first)); }
    if let Some(last) = update.last_name { user.last_name = non_empty(Some(last)); }
    let user = state.store.update_user(user).await?;

    let mut data = state.store.sensitive_data(user.id).await?.unwrap_or_else(|| SensitiveData { user_id: user.id, ..Default::default() });
    let seal = |value: String| state.cipher.encrypt_opt(Some(value.trim()));
    if let Some(v) = update.home_address { data.home_address = seal(v)?; }
    if let Some(v) = update.phone_number { data.phone_number = seal(v)?; }
    if let Some(v) = update.tax_id { data.tax_id = seal(v)?; }
    data.updated_at = Some(chrono::Utc::now());
    state.store.save_sensitive_data(data).await?;

    profile(state, user).await
}

pub async fn change_password(state: &AppState, auth: &AuthUser, req: ChangePasswordRequest) -> Result<()> {
    req.validate()?;
    if !verify_blocking(req.current_password, auth.user.password_hash.clone()).await? {
        return Err(EcommerceError::InvalidCredentials);
    }
    let mut user = auth.user.clone();
    user.password_hash = hash_blocking(req.new_password).await?;
    state.store.update_user(user).await?;
    let revoked = state.store.revoke_user_sessions(auth.id(), Some(auth.token_hash.as_str())).await?;
    tracing::info!(user_id = %auth.id(), revoked, "password changed");
    Ok(())
}

/// Creates a staff account unless one already exists under that email.
pub async fn ensure_staff_account(state: &AppState, email: &str, password: &str, role: Role) -> Result<()> {
    let email = normalize_email(email);
    if state.store.find_user_by_email(&email).await?.is_some() { return Ok(()); }
    let username = email.split('@').next().unwrap_or(role.as_str()).to_string();
    let hash = hash_blocking(password.to_string()).await?;
    let user = state.store.create_user(User::create(username, email, hash, role)).await?;
    tracing::info!(user_id = %user.id, role = %role, "staff account created");
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| EcommerceError::StorageError(e.to_string()))?
}

async fn verify_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| EcommerceError::StorageError(e.to_string()))
}
