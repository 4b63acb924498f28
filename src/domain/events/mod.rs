//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced { order_id: Uuid, user_id: Uuid, total: Decimal },
    OrderStatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    OrderCancelled { order_id: Uuid, restocked_units: u32 },
    RefundRequested { refund_id: Uuid, order_id: Uuid, amount: Decimal },
    RefundApproved { refund_id: Uuid, order_id: Uuid, amount: Decimal },
    RefundRejected { refund_id: Uuid, order_id: Uuid },
    ProductDiscounted { product_id: Uuid, percent: Decimal, price: Decimal },
}

impl DomainEvent {
    /// Subject suffix the event is published under.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "order.placed",
            Self::OrderStatusChanged { .. } => "order.status_changed",
            Self::OrderCancelled { .. } => "order.cancelled",
            Self::RefundRequested { .. } => "refund.requested",
            Self::RefundApproved { .. } => "refund.approved",
            Self::RefundRejected { .. } => "refund.rejected",
            Self::ProductDiscounted { .. } => "product.discounted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let e = DomainEvent::OrderStatusChanged { order_id: Uuid::nil(), from: OrderStatus::Processing, to: OrderStatus::InTransit };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "order_status_changed");
        assert_eq!(json["to"], "in_transit");
        assert_eq!(e.kind(), "order.status_changed");
    }
}
