//! Refund Request Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderError};
use crate::domain::UnknownVariant;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Rejected => "rejected" }
    }
    /// Pending and approved requests block a new request for the same order.
    pub fn is_active(&self) -> bool { !matches!(self, Self::Rejected) }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RefundStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant::new("refund status", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub amount: Decimal,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<Uuid>,
}

impl RefundRequest {
    /// Opens a request for a delivered order inside the refund window.
    /// The amount is what the customer paid, discounts included.
    pub fn open(order: &Order, reason: &str, now: DateTime<Utc>, window_days: i64) -> Result<Self, RefundError> {
        let reason = reason.trim();
        if reason.is_empty() { return Err(RefundError::MissingReason); }
        order.check_refund_window(now, window_days)?;
        Ok(Self {
            id: Uuid::now_v7(), order_id: order.id, user_id: order.user_id, reason: reason.to_string(),
            amount: order.refundable_amount(), status: RefundStatus::Pending, created_at: now,
            decided_at: None, decided_by: None,
        })
    }

    pub fn ensure_pending(&self) -> Result<(), RefundError> {
        if self.status != RefundStatus::Pending { return Err(RefundError::AlreadyDecided(self.status)); }
        Ok(())
    }

    pub fn decide(&mut self, status: RefundStatus, by: Uuid, at: DateTime<Utc>) -> Result<(), RefundError> {
        self.ensure_pending()?;
        self.status = status;
        self.decided_by = Some(by);
        self.decided_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefundError {
    #[error("a refund reason is required")]
    MissingReason,
    #[error("refund request already {0}")]
    AlreadyDecided(RefundStatus),
    #[error("a refund has already been requested for this order")]
    AlreadyRequested,
    #[error(transparent)]
    Order(#[from] OrderError),
}
