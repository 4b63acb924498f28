//! Refund requests and their approval by sales managers.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::aggregates::{OrderStatus, RefundDecision, RefundError, RefundRequest, RefundStatus, Role};
use crate::domain::events::DomainEvent;
use crate::services::orders::{notify_customer, visible_order};
use crate::services::publish;
use crate::{AppState, EcommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct RefundInput {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

/// Opens a refund request for a delivered order inside the refund window.
pub async fn request_refund(state: &AppState, auth: &AuthUser, order_id: Uuid, input: RefundInput) -> Result<RefundRequest> {
    input.validate()?;
    let order = visible_order(state, auth, order_id).await?;
    if !order.is_owned_by(auth.id()) {
        return Err(EcommerceError::Forbidden);
    }
    let refund = RefundRequest::open(&order, &input.reason, Utc::now(), state.config.refund_window_days)?;
    if state.store.refunds_for_order(order.id).await?.iter().any(|r| r.status.is_active()) {
        return Err(RefundError::AlreadyRequested.into());
    }
    let refund = state.store.create_refund(refund).await?;
    tracing::info!(refund_id = %refund.id, order_id = %order.id, amount = %refund.amount, "refund requested");
    publish(state, DomainEvent::RefundRequested { refund_id: refund.id, order_id: order.id, amount: refund.amount }).await;
    Ok(refund)
}

/// Refund history of one order, visible to its owner and to staff.
pub async fn order_refunds(state: &AppState, auth: &AuthUser, order_id: Uuid) -> Result<Vec<RefundRequest>> {
    let order = visible_order(state, auth, order_id).await?;
    state.store.refunds_for_order(order.id).await
}

pub async fn list_refunds(state: &AppState, auth: &AuthUser, status: Option<RefundStatus>) -> Result<Vec<RefundRequest>> {
    auth.require(Role::SalesManager)?;
    state.store.refunds(status).await
}

/// Marks the order refunded, restocks its units and records the decision,
/// all in one store operation.
pub async fn approve_refund(state: &AppState, auth: &AuthUser, refund_id: Uuid) -> Result<RefundRequest> {
    auth.require(Role::SalesManager)?;
    let refund = state.store.find_refund(refund_id).await?.ok_or(EcommerceError::NotFound("refund request"))?;
    refund.ensure_pending()?;
    let order = state.store.find_order(refund.order_id).await?.ok_or(EcommerceError::NotFound("order"))?;

    let mut transition = order.plan_transition(OrderStatus::Refunded, Utc::now())?;
    transition.refund = Some(RefundDecision { refund_id, decided_by: auth.id() });
    let order = state.store.apply_transition(&transition).await?;
    let refund = state.store.find_refund(refund_id).await?.ok_or(EcommerceError::NotFound("refund request"))?;
    tracing::info!(refund_id = %refund.id, order_id = %order.id, amount = %refund.amount, "refund approved");

    publish(state, DomainEvent::RefundApproved { refund_id, order_id: order.id, amount: refund.amount }).await;
    notify_customer(state, &order, "Your refund was approved", format!(
        "Your refund of {:.2} for order {} was approved. The amount will be returned to your original payment method.\n",
        refund.amount, order.id,
    )).await;
    Ok(refund)
}

pub async fn reject_refund(state: &AppState, auth: &AuthUser, refund_id: Uuid) -> Result<RefundRequest> {
    auth.require(Role::SalesManager)?;
    let refund = state.store.reject_refund(refund_id, auth.id(), Utc::now()).await?;
    tracing::info!(refund_id = %refund.id, order_id = %refund.order_id, "refund rejected");

    publish(state, DomainEvent::RefundRejected { refund_id, order_id: refund.order_id }).await;
    if let Some(order) = state.store.find_order(refund.order_id).await? {
        notify_customer(state, &order, "Your refund request was declined", format!(
            "Your refund request for order {} was declined. Contact support if you have questions.\n", order.id,
        )).await;
    }
    Ok(refund)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderError, RefundError};
    use crate::services::testing::{self, delivered, placed};
    use rust_decimal::Decimal;

    fn reason() -> RefundInput { RefundInput { reason: "Arrived damaged".into() } }

    async fn stock(state: &AppState, product_id: Uuid) -> i32 {
        state.store.find_product(product_id).await.unwrap().unwrap().quantity_in_stock
    }

    #[tokio::test]
    async fn test_approved_refund_restocks_once() {
        let (state, outbox) = testing::state();
        let buyer = testing::user(&state, "refunder", Role::Customer).await;
        let sales = testing::user(&state, "sales", Role::SalesManager).await;
        let (order, product_id) = delivered(&state, &buyer, 3).await;
        assert_eq!(stock(&state, product_id).await, 7);

        let refund = request_refund(&state, &buyer, order.id, reason()).await.unwrap();
        assert_eq!(refund.amount, Decimal::new(3600, 2));
        assert!(matches!(request_refund(&state, &buyer, order.id, reason()).await, Err(EcommerceError::Refund(RefundError::AlreadyRequested))));

        let approved = approve_refund(&state, &sales, refund.id).await.unwrap();
        assert_eq!(approved.status, RefundStatus::Approved);
        assert_eq!(approved.decided_by, Some(sales.id()));
        assert_eq!(stock(&state, product_id).await, 10);
        assert_eq!(state.store.find_order(order.id).await.unwrap().unwrap().status, OrderStatus::Refunded);
        assert!(outbox.emails().await.iter().any(|m| m.subject.contains("refund was approved")));

        assert!(matches!(approve_refund(&state, &sales, refund.id).await, Err(EcommerceError::Refund(RefundError::AlreadyDecided(_)))));
        assert_eq!(stock(&state, product_id).await, 10);
    }

    #[tokio::test]
    async fn test_refund_needs_delivered_order_and_owner() {
        let (state, _) = testing::state();
        let buyer = testing::user(&state, "early", Role::Customer).await;
        let other = testing::user(&state, "nosy", Role::Customer).await;
        let (order, _) = placed(&state, &buyer, 5, 1).await;
        let err = request_refund(&state, &buyer, order.id, reason()).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Refund(RefundError::Order(OrderError::NotDelivered(_)))));

        let (order, _) = delivered(&state, &buyer, 1).await;
        assert!(matches!(request_refund(&state, &other, order.id, reason()).await, Err(EcommerceError::NotFound(_))));
        let blank = RefundInput { reason: String::new() };
        assert!(matches!(request_refund(&state, &buyer, order.id, blank).await, Err(EcommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_rejection_allows_a_new_request() {
        let (state, outbox) = testing::state();
        let buyer = testing::user(&state, "retry", Role::Customer).await;
        let sales = testing::user(&state, "sales", Role::SalesManager).await;
        let (order, product_id) = delivered(&state, &buyer, 2).await;

        let first = request_refund(&state, &buyer, order.id, reason()).await.unwrap();
        assert!(matches!(reject_refund(&state, &buyer, first.id).await, Err(EcommerceError::Forbidden)));
        let rejected = reject_refund(&state, &sales, first.id).await.unwrap();
        assert_eq!(rejected.status, RefundStatus::Rejected);
        assert_eq!(stock(&state, product_id).await, 8);
        assert!(approve_refund(&state, &sales, first.id).await.is_err());
        assert!(outbox.emails().await.iter().any(|m| m.subject.contains("declined")));

        let second = request_refund(&state, &buyer, order.id, reason()).await.unwrap();
        assert_eq!(list_refunds(&state, &sales, Some(RefundStatus::Pending)).await.unwrap().len(), 1);
        approve_refund(&state, &sales, second.id).await.unwrap();
        assert_eq!(stock(&state, product_id).await, 10);
    }
}
