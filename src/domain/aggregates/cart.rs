//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::order::{OrderDraft, OrderError, OrderLineDraft};
use crate::domain::aggregates::product::{Product, ProductError};
use crate::domain::value_objects::{round_money, Quantity};

/// Who a cart belongs to: a signed-in user or an anonymous session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(Uuid),
    Session(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub owner: CartOwner,
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(owner: CartOwner, product_id: Uuid, quantity: Quantity) -> Self {
        Self { id: Uuid::now_v7(), owner, product_id, quantity, created_at: Utc::now() }
    }
}

/// Checks that `requested` units may sit in a cart that already holds
/// `in_cart` units of the product.
pub fn check_addition(product: &Product, in_cart: Option<Quantity>, requested: Quantity) -> Result<Quantity, CartError> {
    let merged = match in_cart {
        Some(existing) => existing.add(requested).map_err(|_| CartError::InvalidQuantity)?,
        None => requested,
    };
    product.ensure_stock(merged)?;
    Ok(merged)
}

#[derive(Clone, Debug, Serialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub discounted_price: Decimal,
    pub line_total: Decimal,
    pub in_stock: bool,
}

/// Cart lines joined with current product data.
#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub subtotal: Decimal,
    #[serde(skip)]
    products: HashMap<Uuid, Product>,
}

impl Cart {
    /// Prices cart items. Items whose product no longer exists are dropped.
    pub fn priced(items: &[CartItem], products: Vec<Product>) -> Self {
        let products: HashMap<Uuid, Product> = products.into_iter().map(|p| (p.id, p)).collect();
        let lines: Vec<CartLine> = items.iter().filter_map(|item| {
            let p = products.get(&item.product_id)?;
            let discounted = p.discounted_price();
            Some(CartLine {
                item_id: item.id, product_id: p.id, name: p.name.clone(), quantity: item.quantity,
                unit_price: p.price, discounted_price: discounted,
                line_total: round_money(discounted * item.quantity.as_decimal()),
                in_stock: p.ensure_stock(item.quantity).is_ok(),
            })
        }).collect();
        let subtotal = lines.iter().map(|l| l.line_total).sum();
        Self { lines, subtotal, products }
    }

    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    /// Freezes prices and costs into an order draft, checking stock first.
    pub fn checkout_draft(&self, user_id: Uuid, delivery_address: &str) -> Result<OrderDraft, CartError> {
        if self.lines.is_empty() { return Err(CartError::Empty); }
        let address = delivery_address.trim();
        if address.is_empty() { return Err(CartError::Order(OrderError::MissingAddress)); }
        let mut lines = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            let product = self.products.get(&line.product_id).ok_or(CartError::ItemNotFound)?;
            product.ensure_stock(line.quantity)?;
            lines.push(OrderLineDraft {
                product_id: product.id, product_name: product.name.clone(), quantity: line.quantity,
                unit_price: product.price, discount: product.discount, price_at_purchase: product.discounted_price(),
                cost_at_purchase: product.cost,
            });
        }
        Ok(OrderDraft { order_id: Uuid::now_v7(), user_id, delivery_address: address.to_string(), lines, placed_at: Utc::now() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart is empty")]
    Empty,
    #[error("cart item not found")]
    ItemNotFound,
    #[error("invalid quantity")]
    InvalidQuantity,
    #[error(transparent)]
    Product(#[from] ProductError),
    #[error(transparent)]
    Order(#[from] OrderError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::NewProduct;
    use crate::domain::value_objects::Discount;

    fn product(stock: i32, cents: i64) -> Product {
        Product::create(NewProduct {
            name: "Widget".into(), serial_number: format!("W-{cents}"), quantity_in_stock: stock,
            price: Some(Decimal::new(cents, 2)), ..Default::default()
        }).unwrap()
    }

    #[test]
    fn test_cart_operations() {
        let mut p = product(10, 1000);
        p.discount = Discount::new(Decimal::new(10, 0)).unwrap();
        let owner = CartOwner::Session("abc".into());
        let item = CartItem::new(owner, p.id, Quantity::new(3).unwrap());
        let cart = Cart::priced(&[item], vec![p.clone()]);
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].discounted_price, Decimal::new(900, 2));
        assert_eq!(cart.subtotal, Decimal::new(2700, 2));

        let draft = cart.checkout_draft(Uuid::now_v7(), "  221B Baker St ").unwrap();
        assert_eq!(draft.delivery_address, "221B Baker St");
        assert_eq!(draft.lines[0].unit_price, Decimal::new(1000, 2));
        assert_eq!(draft.lines[0].price_at_purchase, Decimal::new(900, 2));
        assert_eq!(draft.total(), cart.subtotal);
    }

    #[test]
    fn test_addition_merges_and_checks_stock() {
        let p = product(4, 500);
        let merged = check_addition(&p, Some(Quantity::new(2).unwrap()), Quantity::new(2).unwrap()).unwrap();
        assert_eq!(merged.value(), 4);
        let err = check_addition(&p, Some(merged), Quantity::new(1).unwrap()).unwrap_err();
        assert!(matches!(err, CartError::Product(ProductError::InsufficientStock { .. })));
    }

    #[test]
    fn test_checkout_rejects_empty_or_short_stock() {
        let empty = Cart::priced(&[], vec![]);
        assert_eq!(empty.checkout_draft(Uuid::now_v7(), "x").unwrap_err(), CartError::Empty);

        let p = product(1, 500);
        let item = CartItem::new(CartOwner::User(Uuid::now_v7()), p.id, Quantity::new(2).unwrap());
        let cart = Cart::priced(&[item], vec![p]);
        assert!(!cart.lines[0].in_stock);
        assert!(matches!(cart.checkout_draft(Uuid::now_v7(), "x"), Err(CartError::Product(_))));
        assert!(matches!(cart.checkout_draft(Uuid::now_v7(), " "), Err(CartError::Order(OrderError::MissingAddress))));
    }
}
