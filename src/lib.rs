//! Storefront backend
//!
//! Catalog browsing, carts, checkout, reviews, order lifecycle and refunds
//! behind a JSON HTTP API.
//!
//! ## Features
//! - Product catalog with search, category filter and sorting
//! - Anonymous and signed-in carts, merged at login
//! - Checkout with atomic stock reservation, PDF invoices and email
//! - Order lifecycle `processing -> in_transit -> delivered`, cancellation
//!   and refunds with stock restoration
//! - Ratings, moderated comments and reviews for delivered purchases
//! - Role-gated product-manager and sales-manager operations
//! - Encrypted personal data, rate-limited authentication

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use thiserror::Error;

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod invoice;
pub mod notify;
pub mod sanitize;
pub mod seed;
pub mod services;
pub mod store;

pub use api::{router, AppState};
pub use config::Config;

use domain::aggregates::{CartError, OrderError, ProductError, RefundError, ReviewError};
use domain::value_objects::ValueError;
use domain::UnknownVariant;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("permission denied")]
    Forbidden,

    #[error("too many attempts, try again later")]
    RateLimited,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Refund(#[from] RefundError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("encryption error")]
    Crypto,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

impl From<UnknownVariant> for EcommerceError {
    fn from(e: UnknownVariant) -> Self { Self::Validation(e.to_string()) }
}

impl EcommerceError {
    pub fn status(&self) -> StatusCode {
        use EcommerceError::*;
        match self {
            NotFound(_) => StatusCode::NOT_FOUND,
            Validation(_) | Value(_) | Review(ReviewError::Text(_)) => StatusCode::BAD_REQUEST,
            Unauthenticated | InvalidCredentials => StatusCode::UNAUTHORIZED,
            Forbidden | Review(ReviewError::NotPurchased) => StatusCode::FORBIDDEN,
            RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Conflict(_) => StatusCode::CONFLICT,
            Product(ProductError::InsufficientStock { .. } | ProductError::Unavailable { .. }) => StatusCode::CONFLICT,
            Product(_) => StatusCode::BAD_REQUEST,
            Cart(CartError::ItemNotFound) => StatusCode::NOT_FOUND,
            Cart(CartError::Product(ProductError::InsufficientStock { .. } | ProductError::Unavailable { .. })) => StatusCode::CONFLICT,
            Cart(_) => StatusCode::BAD_REQUEST,
            Order(OrderError::MissingAddress) => StatusCode::BAD_REQUEST,
            Order(_) => StatusCode::CONFLICT,
            Refund(RefundError::MissingReason) => StatusCode::BAD_REQUEST,
            Refund(_) => StatusCode::CONFLICT,
            Crypto | StorageError(_) | Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "An internal server error occurred".to_string()
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EcommerceError::NotFound("order").status(), StatusCode::NOT_FOUND);
        assert_eq!(EcommerceError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        let stock = ProductError::InsufficientStock { product_id: Uuid::nil(), requested: 2, available: 1 };
        assert_eq!(EcommerceError::from(CartError::from(stock)).status(), StatusCode::CONFLICT);
        assert_eq!(EcommerceError::StorageError("disk".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
