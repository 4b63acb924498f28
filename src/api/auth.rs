use axum::{extract::State, http::{HeaderMap, StatusCode}, Json};

use crate::api::cart::session_key;
use crate::auth::AuthUser;
use crate::domain::aggregates::User;
use crate::services::accounts::{self, ChangePasswordRequest, LoginRequest, LoginResponse, Profile, ProfileUpdate, RegisterRequest};
use crate::{AppState, Result};

pub async fn register(State(s): State<AppState>, Json(req): Json<RegisterRequest>) -> Result<(StatusCode, Json<User>)> {
    Ok((StatusCode::CREATED, Json(accounts::register(&s, req).await?)))
}

pub async fn login(State(s): State<AppState>, headers: HeaderMap, Json(req): Json<LoginRequest>) -> Result<Json<LoginResponse>> {
    Ok(Json(accounts::login(&s, req, session_key(&headers)).await?))
}

pub async fn logout(State(s): State<AppState>, auth: AuthUser) -> Result<StatusCode> {
    accounts::logout(&s, &auth).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn profile(State(s): State<AppState>, auth: AuthUser) -> Result<Json<Profile>> {
    Ok(Json(accounts::profile(&s, auth.user).await?))
}

pub async fn update_profile(State(s): State<AppState>, auth: AuthUser, Json(update): Json<ProfileUpdate>) -> Result<Json<Profile>> {
    Ok(Json(accounts::update_profile(&s, &auth, update).await?))
}

pub async fn change_password(State(s): State<AppState>, auth: AuthUser, Json(req): Json<ChangePasswordRequest>) -> Result<StatusCode> {
    accounts::change_password(&s, &auth, req).await?;
    Ok(StatusCode::NO_CONTENT)
}
