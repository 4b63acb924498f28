//! Order Aggregate
//!
//! Orders move forward only: `processing -> in_transit -> delivered`, with
//! `cancelled` reachable from `processing` and `refunded` from `delivered`.
//! Stock reconciliation for cancellations and refunds is described by the
//! [`OrderTransition`] handed to the store, which applies it atomically.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{round_money, Discount, Quantity};
use crate::domain::UnknownVariant;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Processing,
    InTransit,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::InTransit)
                | (Self::InTransit, Self::Delivered)
                | (Self::Processing, Self::Cancelled)
                | (Self::Delivered, Self::Refunded)
        )
    }

    /// Transitions that put purchased units back on the shelf.
    pub fn restocks(&self) -> bool { matches!(self, Self::Cancelled | Self::Refunded) }

    /// Orders that count towards revenue.
    pub fn is_settled_sale(&self) -> bool { !self.restocks() }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(UnknownVariant::new("order status", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: Quantity,
    /// List price when the order was placed.
    pub unit_price: Decimal,
    pub discount: Discount,
    /// Discounted unit price actually charged.
    pub price_at_purchase: Decimal,
    pub cost_at_purchase: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal { round_money(self.price_at_purchase * self.quantity.as_decimal()) }
    pub fn line_cost(&self) -> Decimal { round_money(self.cost_at_purchase * self.quantity.as_decimal()) }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Delivery {
    pub address: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub delivery: Delivery,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Amount owed back on a full refund: what the customer actually paid.
    pub fn refundable_amount(&self) -> Decimal {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }

    pub fn contains_product(&self, product_id: Uuid) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }

    /// Plans a status change. Nothing is mutated; the store applies the plan.
    pub fn plan_transition(&self, to: OrderStatus, at: DateTime<Utc>) -> Result<OrderTransition, OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition { from: self.status, to });
        }
        let restock = if to.restocks() {
            self.items.iter().map(|i| (i.product_id, i.quantity)).collect()
        } else {
            Vec::new()
        };
        Ok(OrderTransition { order_id: self.id, from: self.status, to, at, restock, refund: None })
    }

    pub fn plan_cancellation(&self, at: DateTime<Utc>) -> Result<OrderTransition, OrderError> {
        if self.status != OrderStatus::Processing {
            return Err(OrderError::NotCancellable(self.status));
        }
        self.plan_transition(OrderStatus::Cancelled, at)
    }

    pub fn check_refund_window(&self, now: DateTime<Utc>, window_days: i64) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered { return Err(OrderError::NotDelivered(self.status)); }
        let delivered_at = self.delivery.delivered_at.unwrap_or(self.updated_at);
        if now - delivered_at > Duration::days(window_days) {
            return Err(OrderError::RefundWindowClosed { days: window_days });
        }
        Ok(())
    }

    /// Applies a planned transition in memory. Used by stores after the
    /// guarded write succeeded.
    pub fn apply(&mut self, t: &OrderTransition) {
        self.status = t.to;
        match t.to {
            OrderStatus::InTransit => self.delivery.shipped_at = Some(t.at),
            OrderStatus::Delivered => self.delivery.delivered_at = Some(t.at),
            _ => {}
        }
        self.updated_at = t.at;
    }
}

/// A status change planned against a known current status.
#[derive(Clone, Debug)]
pub struct OrderTransition {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    pub restock: Vec<(Uuid, Quantity)>,
    /// Refund request approved together with this transition.
    pub refund: Option<RefundDecision>,
}

#[derive(Clone, Debug)]
pub struct RefundDecision {
    pub refund_id: Uuid,
    pub decided_by: Uuid,
}

/// Line captured at checkout.
#[derive(Clone, Debug)]
pub struct OrderLineDraft {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub discount: Discount,
    pub price_at_purchase: Decimal,
    pub cost_at_purchase: Decimal,
}

/// Everything the store needs to place an order in one transaction.
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub delivery_address: String,
    pub lines: Vec<OrderLineDraft>,
    pub placed_at: DateTime<Utc>,
}

impl OrderDraft {
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|l| round_money(l.price_at_purchase * l.quantity.as_decimal())).sum()
    }

    /// Order as it exists once the store committed the draft.
    pub fn into_order(self) -> Order {
        let total_price = self.total();
        let items = self.lines.into_iter().map(|l| OrderItem {
            id: Uuid::now_v7(), order_id: self.order_id, product_id: l.product_id, product_name: l.product_name,
            quantity: l.quantity, unit_price: l.unit_price, discount: l.discount,
            price_at_purchase: l.price_at_purchase, cost_at_purchase: l.cost_at_purchase,
        }).collect();
        Order {
            id: self.order_id, user_id: self.user_id, status: OrderStatus::Processing, total_price,
            delivery: Delivery { address: self.delivery_address, shipped_at: None, delivered_at: None },
            // Payment is mocked: confirmed when the order is placed.
            payment_confirmed_at: Some(self.placed_at), items, created_at: self.placed_at, updated_at: self.placed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("only processing orders can be cancelled (order is {0})")]
    NotCancellable(OrderStatus),
    #[error("only delivered orders can be refunded (order is {0})")]
    NotDelivered(OrderStatus),
    #[error("refunds are accepted within {days} days of delivery")]
    RefundWindowClosed { days: i64 },
    #[error("delivery address is required")]
    MissingAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> OrderDraft {
        let line = |price: i64, qty: i64, pct: i64| {
            let discount = Discount::new(Decimal::new(pct, 0)).unwrap();
            OrderLineDraft {
                product_id: Uuid::now_v7(), product_name: "Widget".into(), quantity: Quantity::new(qty).unwrap(),
                unit_price: Decimal::new(price, 2), discount, price_at_purchase: discount.apply(Decimal::new(price, 2)),
                cost_at_purchase: Decimal::new(price / 2, 2),
            }
        };
        OrderDraft {
            order_id: Uuid::now_v7(), user_id: Uuid::now_v7(), delivery_address: "1 Main St".into(),
            lines: vec![line(10000, 2, 0), line(1999, 3, 15)], placed_at: Utc::now(),
        }
    }

    #[test]
    fn test_total_uses_discounted_prices() {
        let order = draft().into_order();
        // 2 * 100.00 + 3 * 16.99
        assert_eq!(order.total_price, Decimal::new(25097, 2));
        assert_eq!(order.refundable_amount(), order.total_price);
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(order.payment_confirmed_at.is_some());
    }

    #[test]
    fn test_order_workflow() {
        let mut order = draft().into_order();
        let ship = order.plan_transition(OrderStatus::InTransit, Utc::now()).unwrap();
        assert!(ship.restock.is_empty());
        order.apply(&ship);
        assert!(order.delivery.shipped_at.is_some());
        assert!(order.plan_cancellation(Utc::now()).is_err());
        let deliver = order.plan_transition(OrderStatus::Delivered, Utc::now()).unwrap();
        order.apply(&deliver);
        assert_eq!(order.status, OrderStatus::Delivered);
        let refund = order.plan_transition(OrderStatus::Refunded, Utc::now()).unwrap();
        assert_eq!(refund.restock.len(), 2);
    }

    #[test]
    fn test_transitions_are_one_directional() {
        use OrderStatus::*;
        for from in [Processing, InTransit, Delivered, Cancelled, Refunded] {
            assert!(!from.can_transition_to(from));
            assert!(!from.can_transition_to(Processing));
        }
        assert!(!InTransit.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(InTransit));
        assert!(!Cancelled.can_transition_to(Refunded));
        assert!(!Refunded.can_transition_to(Delivered));
    }

    #[test]
    fn test_cancellation_restocks_every_line() {
        let order = draft().into_order();
        let t = order.plan_cancellation(Utc::now()).unwrap();
        assert_eq!(t.to, OrderStatus::Cancelled);
        let units: u32 = t.restock.iter().map(|(_, q)| q.value()).sum();
        assert_eq!(units, 5);
    }

    #[test]
    fn test_refund_window() {
        let mut order = draft().into_order();
        assert_eq!(order.check_refund_window(Utc::now(), 30), Err(OrderError::NotDelivered(OrderStatus::Processing)));
        order.status = OrderStatus::Delivered;
        order.delivery.delivered_at = Some(Utc::now() - Duration::days(31));
        assert_eq!(order.check_refund_window(Utc::now(), 30), Err(OrderError::RefundWindowClosed { days: 30 }));
        order.delivery.delivered_at = Some(Utc::now() - Duration::days(2));
        assert!(order.check_refund_window(Utc::now(), 30).is_ok());
    }
}
