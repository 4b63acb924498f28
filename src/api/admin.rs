//! Staff endpoints. Role checks happen in the services.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::catalog::ListParams;
use crate::api::orders::pdf_response;
use crate::api::{DateRange, StatusFilter};
use crate::auth::AuthUser;
use crate::domain::aggregates::{Category, Comment, ModerationStatus, Order, OrderStatus, Product, ProductReview, RefundRequest, RefundStatus, Role};
use crate::domain::reports::RevenueReport;
use crate::invoice::InvoiceSummary;
use crate::services::catalog::{self, CategoryInput, PricingInput, ProductInput};
use crate::services::reviews::{self as feedback, ModerationInput};
use crate::services::{checkout, orders, refunds, reports};
use crate::store::Page;
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct StockInput {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct StatusInput {
    pub status: OrderStatus,
}

pub async fn create_category(State(s): State<AppState>, auth: AuthUser, Json(input): Json<CategoryInput>) -> Result<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(catalog::create_category(&s, &auth, input).await?)))
}

pub async fn delete_category(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    catalog::delete_category(&s, &auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_products(State(s): State<AppState>, auth: AuthUser, Query(p): Query<ListParams>) -> Result<Json<Page<Product>>> {
    Ok(Json(catalog::list_all_products(&s, &auth, p.into()).await?))
}

pub async fn create_product(State(s): State<AppState>, auth: AuthUser, Json(input): Json<ProductInput>) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(catalog::create_product(&s, &auth, input).await?)))
}

pub async fn update_product(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<ProductInput>) -> Result<Json<Product>> {
    Ok(Json(catalog::update_product(&s, &auth, id, input).await?))
}

pub async fn delete_product(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    catalog::delete_product(&s, &auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_stock(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<StockInput>) -> Result<Json<Product>> {
    Ok(Json(catalog::set_stock(&s, &auth, id, input.quantity).await?))
}

pub async fn set_pricing(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<PricingInput>) -> Result<Json<Product>> {
    Ok(Json(catalog::set_pricing(&s, &auth, id, input).await?))
}

pub async fn list_orders(State(s): State<AppState>, auth: AuthUser, Query(f): Query<StatusFilter<OrderStatus>>) -> Result<Json<Vec<Order>>> {
    Ok(Json(orders::list_orders(&s, &auth, f.status).await?))
}

pub async fn set_order_status(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<StatusInput>) -> Result<Json<Order>> {
    Ok(Json(orders::advance_order(&s, &auth, id, input.status).await?))
}

pub async fn list_comments(State(s): State<AppState>, auth: AuthUser, Query(f): Query<StatusFilter<ModerationStatus>>) -> Result<Json<Vec<Comment>>> {
    Ok(Json(feedback::list_comments(&s, &auth, f.status).await?))
}

pub async fn moderate_comment(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<ModerationInput>) -> Result<Json<Comment>> {
    Ok(Json(feedback::moderate_comment(&s, &auth, id, input.approve).await?))
}

pub async fn list_reviews(State(s): State<AppState>, auth: AuthUser, Query(f): Query<StatusFilter<ModerationStatus>>) -> Result<Json<Vec<ProductReview>>> {
    Ok(Json(feedback::list_reviews(&s, &auth, f.status).await?))
}

pub async fn moderate_review(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>, Json(input): Json<ModerationInput>) -> Result<Json<ProductReview>> {
    Ok(Json(feedback::moderate_review(&s, &auth, id, input.approve).await?))
}

pub async fn list_invoices(State(s): State<AppState>, auth: AuthUser, Query(range): Query<DateRange>) -> Result<Json<Vec<InvoiceSummary>>> {
    let (from, to) = range.resolve()?;
    Ok(Json(checkout::list_invoices(&s, &auth, from, to).await?))
}

pub async fn get_invoice(State(s): State<AppState>, auth: AuthUser, Path(order_id): Path<Uuid>) -> Result<Response> {
    auth.require(Role::SalesManager)?;
    Ok(pdf_response(checkout::order_invoice(&s, &auth, order_id).await?))
}

pub async fn revenue_report(State(s): State<AppState>, auth: AuthUser, Query(range): Query<DateRange>) -> Result<Json<RevenueReport>> {
    let (from, to) = range.resolve()?;
    Ok(Json(reports::revenue_report(&s, &auth, from, to).await?))
}

pub async fn list_refunds(State(s): State<AppState>, auth: AuthUser, Query(f): Query<StatusFilter<RefundStatus>>) -> Result<Json<Vec<RefundRequest>>> {
    Ok(Json(refunds::list_refunds(&s, &auth, f.status).await?))
}

pub async fn approve_refund(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<Json<RefundRequest>> {
    Ok(Json(refunds::approve_refund(&s, &auth, id).await?))
}

pub async fn reject_refund(State(s): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<Json<RefundRequest>> {
    Ok(Json(refunds::reject_refund(&s, &auth, id).await?))
}
