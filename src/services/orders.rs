//! Order lifecycle: viewing, shipping, delivery and cancellation.

use chrono::Utc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::aggregates::{Order, OrderStatus, Role};
use crate::domain::events::DomainEvent;
use crate::services::{email, publish, send_email};
use crate::{AppState, EcommerceError, Result};

/// Customers see their own orders, staff see all. Anything else is reported
/// as missing.
pub async fn visible_order(state: &AppState, auth: &AuthUser, order_id: Uuid) -> Result<Order> {
    let order = state.store.find_order(order_id).await?.ok_or(EcommerceError::NotFound("order"))?;
    if !order.is_owned_by(auth.id()) && !auth.role().is_staff() {
        return Err(EcommerceError::NotFound("order"));
    }
    Ok(order)
}

pub async fn my_orders(state: &AppState, auth: &AuthUser) -> Result<Vec<Order>> {
    state.store.orders_for_user(auth.id()).await
}

pub async fn list_orders(state: &AppState, auth: &AuthUser, status: Option<OrderStatus>) -> Result<Vec<Order>> {
    auth.require_staff()?;
    state.store.list_orders(status).await
}

/// Cancels a processing order and puts its units back in stock. Allowed for
/// the customer who placed it and for product managers.
pub async fn cancel_order(state: &AppState, auth: &AuthUser, order_id: Uuid) -> Result<Order> {
    let order = visible_order(state, auth, order_id).await?;
    if !order.is_owned_by(auth.id()) {
        auth.require(Role::ProductManager)?;
    }
    let transition = order.plan_cancellation(Utc::now())?;
    let restocked_units: u32 = transition.restock.iter().map(|(_, q)| q.value()).sum();
    let order = state.store.apply_transition(&transition).await?;
    tracing::info!(order_id = %order.id, by = %auth.id(), restocked_units, "order cancelled");

    publish(state, DomainEvent::OrderCancelled { order_id: order.id, restocked_units }).await;
    notify_customer(state, &order, "Your order has been cancelled", format!(
        "Order {} has been cancelled. No charge remains on it.\n", order.id,
    )).await;
    Ok(order)
}

/// Product-manager status changes. Cancelling goes through [`cancel_order`];
/// refunds only happen by approving a refund request.
pub async fn advance_order(state: &AppState, auth: &AuthUser, order_id: Uuid, to: OrderStatus) -> Result<Order> {
    auth.require(Role::ProductManager)?;
    match to {
        OrderStatus::Cancelled => return cancel_order(state, auth, order_id).await,
        OrderStatus::Refunded => {
            return Err(EcommerceError::Validation("orders are refunded by approving a refund request".into()));
        }
        _ => {}
    }
    let order = state.store.find_order(order_id).await?.ok_or(EcommerceError::NotFound("order"))?;
    let transition = order.plan_transition(to, Utc::now())?;
    let order = state.store.apply_transition(&transition).await?;
    tracing::info!(order_id = %order.id, from = %transition.from, to = %order.status, "order status changed");

    publish(state, DomainEvent::OrderStatusChanged { order_id: order.id, from: transition.from, to: order.status }).await;
    let (subject, body) = match order.status {
        OrderStatus::InTransit => ("Your order is on its way", format!("Order {} has shipped to {}.\n", order.id, order.delivery.address)),
        _ => ("Your order has been delivered", format!(
            "Order {} was delivered. You can rate and review its products, and request a refund within {} days.\n",
            order.id, state.config.refund_window_days,
        )),
    };
    notify_customer(state, &order, subject, body).await;
    Ok(order)
}

pub(crate) async fn notify_customer(state: &AppState, order: &Order, subject: &str, body: String) {
    match state.store.find_user(order.user_id).await {
        Ok(Some(customer)) => send_email(state, email(state, &customer.email, subject, body)).await,
        Ok(None) => tracing::warn!(order_id = %order.id, "order customer no longer exists"),
        Err(e) => tracing::warn!(order_id = %order.id, error = %e, "could not load order customer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderError;
    use crate::services::testing::{self, placed};

    async fn stock(state: &AppState, product_id: Uuid) -> i32 {
        state.store.find_product(product_id).await.unwrap().unwrap().quantity_in_stock
    }

    #[tokio::test]
    async fn test_customer_cancels_and_stock_returns() {
        let (state, outbox) = testing::state();
        let buyer = testing::user(&state, "canceller", Role::Customer).await;
        let (order, product_id) = placed(&state, &buyer, 5, 2).await;
        assert_eq!(stock(&state, product_id).await, 3);

        let cancelled = cancel_order(&state, &buyer, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock(&state, product_id).await, 5);
        assert!(outbox.emails().await.iter().any(|m| m.subject.contains("cancelled")));

        // A second cancellation must not restock again.
        assert!(matches!(cancel_order(&state, &buyer, order.id).await, Err(EcommerceError::Order(OrderError::NotCancellable(_)))));
        assert_eq!(stock(&state, product_id).await, 5);
    }

    #[tokio::test]
    async fn test_only_owner_or_product_manager_cancels() {
        let (state, _) = testing::state();
        let buyer = testing::user(&state, "owner", Role::Customer).await;
        let other = testing::user(&state, "other", Role::Customer).await;
        let sales = testing::user(&state, "sales", Role::SalesManager).await;
        let pm = testing::user(&state, "pm", Role::ProductManager).await;
        let (order, _) = placed(&state, &buyer, 5, 1).await;

        assert!(matches!(cancel_order(&state, &other, order.id).await, Err(EcommerceError::NotFound(_))));
        assert!(matches!(cancel_order(&state, &sales, order.id).await, Err(EcommerceError::Forbidden)));
        assert_eq!(cancel_order(&state, &pm, order.id).await.unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_lifecycle_moves_forward_only() {
        let (state, outbox) = testing::state();
        let buyer = testing::user(&state, "lifecycle", Role::Customer).await;
        let pm = testing::user(&state, "pm", Role::ProductManager).await;
        let (order, _) = placed(&state, &buyer, 5, 1).await;

        assert!(matches!(advance_order(&state, &buyer, order.id, OrderStatus::InTransit).await, Err(EcommerceError::Forbidden)));
        assert!(advance_order(&state, &pm, order.id, OrderStatus::Delivered).await.is_err());
        let shipped = advance_order(&state, &pm, order.id, OrderStatus::InTransit).await.unwrap();
        assert!(shipped.delivery.shipped_at.is_some());
        assert!(cancel_order(&state, &buyer, order.id).await.is_err());
        assert!(advance_order(&state, &pm, order.id, OrderStatus::InTransit).await.is_err());
        let delivered = advance_order(&state, &pm, order.id, OrderStatus::Delivered).await.unwrap();
        assert!(delivered.delivery.delivered_at.is_some());
        assert!(matches!(advance_order(&state, &pm, order.id, OrderStatus::Refunded).await, Err(EcommerceError::Validation(_))));

        let changes = outbox.events().await.into_iter().filter(|e| matches!(e, DomainEvent::OrderStatusChanged { .. })).count();
        assert_eq!(changes, 2);
    }

    #[tokio::test]
    async fn test_order_listing() {
        let (state, _) = testing::state();
        let buyer = testing::user(&state, "lister", Role::Customer).await;
        let sales = testing::user(&state, "sales2", Role::SalesManager).await;
        placed(&state, &buyer, 5, 1).await;
        assert_eq!(my_orders(&state, &buyer).await.unwrap().len(), 1);
        assert!(matches!(list_orders(&state, &buyer, None).await, Err(EcommerceError::Forbidden)));
        assert_eq!(list_orders(&state, &sales, Some(OrderStatus::Processing)).await.unwrap().len(), 1);
        assert!(list_orders(&state, &sales, Some(OrderStatus::Delivered)).await.unwrap().is_empty());
    }
}
