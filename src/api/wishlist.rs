use axum::{extract::{Path, State}, http::StatusCode, Json};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::aggregates::Product;
use crate::services::wishlist as wishlists;
use crate::{AppState, Result};

pub async fn list(State(s): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Product>>> {
    Ok(Json(wishlists::wishlist(&s, &auth).await?))
}

pub async fn add(State(s): State<AppState>, auth: AuthUser, Path(product_id): Path<Uuid>) -> Result<StatusCode> {
    let added = wishlists::add(&s, &auth, product_id).await?;
    Ok(if added { StatusCode::CREATED } else { StatusCode::OK })
}

pub async fn remove(State(s): State<AppState>, auth: AuthUser, Path(product_id): Path<Uuid>) -> Result<StatusCode> {
    wishlists::remove(&s, &auth, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
