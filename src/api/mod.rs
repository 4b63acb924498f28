//! HTTP surface.

mod admin;
mod auth;
mod cart;
mod catalog;
mod orders;
mod reviews;
mod wishlist;

use std::sync::Arc;

use axum::{middleware, routing::{get, post, put}, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::RateLimiter;
use crate::crypto::{CryptoError, FieldCipher};
use crate::notify::Notifier;
use crate::sanitize::block_suspicious_input;
use crate::store::Store;
use crate::{Config, EcommerceError, Result};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub cipher: Arc<FieldCipher>,
    pub limiter: RateLimiter,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> std::result::Result<Self, CryptoError> {
        let cipher = FieldCipher::from_config(config.encryption_key.as_deref())?;
        let limiter = RateLimiter::new(config.auth_rate_limit_attempts, config.auth_rate_limit_window);
        Ok(Self { store, notifier, cipher: Arc::new(cipher), limiter, config: Arc::new(config) })
    }
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", get(auth::profile).put(auth::update_profile))
        .route("/auth/change-password", post(auth::change_password))
        .route("/categories", get(catalog::list_categories))
        .route("/products", get(catalog::list_products))
        .route("/products/:id", get(catalog::get_product))
        .route("/products/:id/reviews", get(reviews::list).post(reviews::review))
        .route("/products/:id/ratings", post(reviews::rate))
        .route("/products/:id/comments", post(reviews::comment))
        .route("/cart", get(cart::view).delete(cart::clear))
        .route("/cart/items", post(cart::add_item))
        .route("/cart/items/:id", axum::routing::patch(cart::update_item).delete(cart::remove_item))
        .route("/orders", get(orders::list).post(orders::checkout))
        .route("/orders/:id", get(orders::get))
        .route("/orders/:id/cancel", post(orders::cancel))
        .route("/orders/:id/refund", get(orders::refunds).post(orders::request_refund))
        .route("/orders/:id/invoice", get(orders::invoice))
        .route("/wishlist", get(wishlist::list))
        .route("/wishlist/:product_id", post(wishlist::add).delete(wishlist::remove));

    let admin = Router::new()
        .route("/categories", post(admin::create_category))
        .route("/categories/:id", axum::routing::delete(admin::delete_category))
        .route("/products", get(admin::list_products).post(admin::create_product))
        .route("/products/:id", put(admin::update_product).delete(admin::delete_product))
        .route("/products/:id/stock", put(admin::set_stock))
        .route("/products/:id/pricing", put(admin::set_pricing))
        .route("/orders", get(admin::list_orders))
        .route("/orders/:id/status", put(admin::set_order_status))
        .route("/comments", get(admin::list_comments))
        .route("/comments/:id", put(admin::moderate_comment))
        .route("/reviews", get(admin::list_reviews))
        .route("/reviews/:id", put(admin::moderate_review))
        .route("/invoices", get(admin::list_invoices))
        .route("/invoices/:order_id", get(admin::get_invoice))
        .route("/reports/revenue", get(admin::revenue_report))
        .route("/refunds", get(admin::list_refunds))
        .route("/refunds/:id/approve", post(admin::approve_refund))
        .route("/refunds/:id/reject", post(admin::reject_refund));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }))
        .nest("/api", public.nest("/admin", admin))
        .layer(middleware::from_fn(block_suspicious_input))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `?from=&to=` window; defaults to the last 30 days.
#[derive(Debug, Deserialize)]
pub(crate) struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn resolve(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let to = self.to.unwrap_or_else(Utc::now);
        let from = self.from.unwrap_or(to - Duration::days(30));
        if from > to { return Err(EcommerceError::Validation("`from` must not be after `to`".into())); }
        Ok((from, to))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusFilter<T> {
    pub status: Option<T>,
}
