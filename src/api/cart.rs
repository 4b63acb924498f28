//! Cart endpoints. Signed-in users are identified by their bearer token,
//! anonymous visitors by the `X-Session-Key` header, which the server hands
//! out with the first item added.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Cart, CartItem, CartOwner};
use crate::domain::value_objects::Quantity;
use crate::services::cart as carts;
use crate::{AppState, EcommerceError, Result};

pub const SESSION_HEADER: HeaderName = HeaderName::from_static("x-session-key");

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

/// Client-supplied session key, if it looks like one we issued.
pub fn session_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(&SESSION_HEADER)?.to_str().ok().map(str::trim)
        .filter(|k| (8..=64).contains(&k.len()) && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

fn owner(auth: Option<&AuthUser>, headers: &HeaderMap) -> Option<CartOwner> {
    match auth {
        Some(user) => Some(CartOwner::User(user.id())),
        None => session_key(headers).map(|k| CartOwner::Session(k.to_string())),
    }
}

pub async fn view(State(s): State<AppState>, auth: Option<AuthUser>, headers: HeaderMap) -> Result<Json<Cart>> {
    match owner(auth.as_ref(), &headers) {
        Some(owner) => Ok(Json(carts::view(&s, &owner).await?)),
        None => Ok(Json(Cart::priced(&[], Vec::new()))),
    }
}

pub async fn clear(State(s): State<AppState>, auth: Option<AuthUser>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(owner) = owner(auth.as_ref(), &headers) {
        s.store.clear_cart(&owner).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_item(State(s): State<AppState>, auth: Option<AuthUser>, headers: HeaderMap, Json(req): Json<AddItemRequest>) -> Result<Response> {
    let quantity = Quantity::new(req.quantity)?;
    let (owner, issued) = match owner(auth.as_ref(), &headers) {
        Some(owner) => (owner, None),
        None => {
            let key = Uuid::new_v4().simple().to_string();
            (CartOwner::Session(key.clone()), Some(key))
        }
    };
    let item: CartItem = carts::add_item(&s, &owner, req.product_id, quantity).await?;
    let mut response = (StatusCode::CREATED, Json(item)).into_response();
    if let Some(key) = issued {
        let value = HeaderValue::from_str(&key).map_err(|e| EcommerceError::Validation(e.to_string()))?;
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    Ok(response)
}

pub async fn update_item(
    State(s): State<AppState>,
    auth: Option<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartItem>> {
    let owner = owner(auth.as_ref(), &headers).ok_or(EcommerceError::NotFound("cart item"))?;
    Ok(Json(carts::set_quantity(&s, &owner, id, Quantity::new(req.quantity)?).await?))
}

pub async fn remove_item(State(s): State<AppState>, auth: Option<AuthUser>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let owner = owner(auth.as_ref(), &headers).ok_or(EcommerceError::NotFound("cart item"))?;
    carts::remove_item(&s, &owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
