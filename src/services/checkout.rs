//! Checkout and invoicing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::domain::aggregates::{CartOwner, Order, Role, User};
use crate::domain::events::DomainEvent;
use crate::invoice::{invoice_lines, Invoice, InvoiceSummary};
use crate::notify::Attachment;
use crate::services::orders::visible_order;
use crate::services::{cart, email, publish, send_email};
use crate::{AppState, EcommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 500))]
    pub delivery_address: String,
}

/// Turns the user's cart into an order. Stock, the order and the cart are
/// committed together; the invoice and its email follow and may fail
/// without affecting the order.
pub async fn checkout(state: &AppState, auth: &AuthUser, req: CheckoutRequest) -> Result<Order> {
    req.validate()?;
    let cart = cart::view(state, &CartOwner::User(auth.id())).await?;
    let draft = cart.checkout_draft(auth.id(), &req.delivery_address)?;
    let order = state.store.place_order(draft).await?;
    tracing::info!(order_id = %order.id, user_id = %auth.id(), total = %order.total_price, "order placed");

    publish(state, DomainEvent::OrderPlaced { order_id: order.id, user_id: order.user_id, total: order.total_price }).await;
    let invoice = issue_invoice(state, &order, &auth.user).await;
    send_invoice(state, &order, &auth.user, &invoice).await;
    Ok(order)
}

async fn issue_invoice(state: &AppState, order: &Order, customer: &User) -> Invoice {
    let invoice = Invoice::generate(order, customer, Utc::now());
    if let Err(e) = state.store.save_invoice(invoice.clone()).await {
        tracing::error!(order_id = %order.id, error = %e, "invoice could not be stored; it will be regenerated on download");
    }
    invoice
}

async fn send_invoice(state: &AppState, order: &Order, customer: &User, invoice: &Invoice) {
    let mut body = format!("Hi {},\n\nThank you for your order. Your invoice is attached.\n\n", customer.display_name());
    body.push_str(&invoice_lines(&invoice.number, order, customer, invoice.issued_at).join("\n"));
    let mut message = email(state, &customer.email, format!("Your order {}", invoice.number), body);
    message.attachments.push(Attachment::pdf(invoice.filename(), &invoice.pdf));
    send_email(state, message).await;
}

/// The stored invoice, regenerated if checkout could not store it.
pub async fn order_invoice(state: &AppState, auth: &AuthUser, order_id: Uuid) -> Result<Invoice> {
    let order = visible_order(state, auth, order_id).await?;
    if let Some(invoice) = state.store.invoice_for_order(order.id).await? {
        return Ok(invoice);
    }
    let customer = state.store.find_user(order.user_id).await?.ok_or(EcommerceError::NotFound("customer"))?;
    tracing::info!(order_id = %order.id, "regenerating missing invoice");
    Ok(issue_invoice(state, &order, &customer).await)
}

pub async fn list_invoices(state: &AppState, auth: &AuthUser, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<InvoiceSummary>> {
    auth.require(Role::SalesManager)?;
    if from > to { return Err(EcommerceError::Validation("`from` must not be after `to`".into())); }
    state.store.list_invoices(from, to).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CartError, ProductError};
    use crate::domain::value_objects::Quantity;
    use crate::services::testing;

    async fn fill_cart(state: &AppState, auth: &AuthUser, product_id: Uuid, qty: i64) {
        cart::add_item(state, &CartOwner::User(auth.id()), product_id, Quantity::new(qty).unwrap()).await.unwrap();
    }

    fn address() -> CheckoutRequest { CheckoutRequest { delivery_address: "1 Main St".into() } }

    #[tokio::test]
    async fn test_checkout_places_order_and_sends_invoice() {
        let (state, outbox) = testing::state();
        let buyer = testing::user(&state, "buyer", Role::Customer).await;
        let product = testing::product(&state, "CK-1", 5, 2500).await;
        fill_cart(&state, &buyer, product.id, 2).await;

        let order = checkout(&state, &buyer, address()).await.unwrap();
        assert_eq!(order.total_price, rust_decimal::Decimal::new(5000, 2));
        assert_eq!(state.store.find_product(product.id).await.unwrap().unwrap().quantity_in_stock, 3);
        assert!(state.store.cart_items(&CartOwner::User(buyer.id())).await.unwrap().is_empty());

        let invoice = state.store.invoice_for_order(order.id).await.unwrap().unwrap();
        assert!(invoice.pdf.starts_with(b"%PDF-1.4"));
        let emails = outbox.emails().await;
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].attachments[0].filename, invoice.filename());
        assert!(matches!(outbox.events().await[0], DomainEvent::OrderPlaced { .. }));
    }

    #[tokio::test]
    async fn test_checkout_rejects_empty_cart_and_short_stock() {
        let (state, outbox) = testing::state();
        let buyer = testing::user(&state, "empty", Role::Customer).await;
        assert!(matches!(checkout(&state, &buyer, address()).await, Err(EcommerceError::Cart(CartError::Empty))));

        let product = testing::product(&state, "CK-2", 3, 1000).await;
        fill_cart(&state, &buyer, product.id, 3).await;
        state.store.set_stock(product.id, 1).await.unwrap();
        let err = checkout(&state, &buyer, address()).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Cart(CartError::Product(ProductError::InsufficientStock { .. }))));
        assert_eq!(state.store.find_product(product.id).await.unwrap().unwrap().quantity_in_stock, 1);
        assert!(state.store.orders_for_user(buyer.id()).await.unwrap().is_empty());
        assert!(outbox.emails().await.is_empty());
    }

    #[tokio::test]
    async fn test_invoice_access() {
        let (state, _) = testing::state();
        let buyer = testing::user(&state, "inv", Role::Customer).await;
        let stranger = testing::user(&state, "stranger", Role::Customer).await;
        let sales = testing::user(&state, "sales", Role::SalesManager).await;
        let product = testing::product(&state, "CK-3", 5, 1000).await;
        fill_cart(&state, &buyer, product.id, 1).await;
        let order = checkout(&state, &buyer, address()).await.unwrap();

        assert_eq!(order_invoice(&state, &buyer, order.id).await.unwrap().order_id, order.id);
        assert!(matches!(order_invoice(&state, &stranger, order.id).await, Err(EcommerceError::NotFound(_))));
        let listed = list_invoices(&state, &sales, order.created_at - chrono::Duration::hours(1), Utc::now()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(matches!(list_invoices(&state, &buyer, order.created_at, Utc::now()).await, Err(EcommerceError::Forbidden)));
    }

    #[tokio::test]
    async fn test_missing_invoice_is_regenerated_with_its_original_number() {
        let (state, _) = testing::state();
        let buyer = testing::user(&state, "regen", Role::Customer).await;
        let product = testing::product(&state, "CK-4", 5, 1000).await;
        fill_cart(&state, &buyer, product.id, 1).await;
        let draft = cart::view(&state, &CartOwner::User(buyer.id())).await.unwrap().checkout_draft(buyer.id(), "1 Main St").unwrap();
        let order = state.store.place_order(draft).await.unwrap();
        assert!(state.store.invoice_for_order(order.id).await.unwrap().is_none());

        let invoice = order_invoice(&state, &buyer, order.id).await.unwrap();
        assert_eq!(invoice.number, crate::invoice::invoice_number(order.id, order.created_at));
        assert_eq!(state.store.invoice_for_order(order.id).await.unwrap().unwrap().number, invoice.number);
    }
}
