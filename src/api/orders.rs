use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Order, RefundRequest};
use crate::invoice::Invoice;
use crate::services::checkout::{self, CheckoutRequest};
use crate::services::refunds::{self, RefundInput};
use crate::services::orders as order_service;
use crate::{AppState, Result};

pub async fn checkout(State(s): State<AppState>, auth: AuthUser, Json(req): Json<CheckoutRequest>) -> Result<(StatusCode, Json<Order>)> {
    Ok((StatusCode::CREATED, Json(checkout::checkout(&s, &auth, req).await?)))
}

pub async fn list(State(s): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(order_service::my_orders(&s, &auth).await?))
}

pub async fn get(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(order_service::visible_order(&s, &auth, id).await?))
}

pub async fn cancel(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(order_service::cancel_order(&s, &auth, id).await?))
}

pub async fn request_refund(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<RefundInput>) -> Result<(StatusCode, Json<RefundRequest>)> {
    Ok((StatusCode::CREATED, Json(refunds::request_refund(&s, &auth, id, input).await?)))
}

pub async fn refunds(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Vec<RefundRequest>>> {
    Ok(Json(refunds::order_refunds(&s, &auth, id).await?))
}

pub async fn invoice(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<Response> {
    Ok(pdf_response(checkout::order_invoice(&s, &auth, id).await?))
}

pub(crate) fn pdf_response(invoice: Invoice) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", invoice.filename());
    ([(header::CONTENT_TYPE, "application/pdf".to_string()), (header::CONTENT_DISPOSITION, disposition)], invoice.pdf).into_response()
}
