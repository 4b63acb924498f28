//! Ratings, comments and reviews

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Score;
use crate::domain::UnknownVariant;
use crate::sanitize::{check_text, escape_html, TextError};

pub const MAX_TEXT_LEN: usize = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Rejected => "rejected" }
    }
    pub fn from_decision(approve: bool) -> Self { if approve { Self::Approved } else { Self::Rejected } }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ModerationStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant::new("moderation status", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub score: Score,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(user_id: Uuid, product_id: Uuid, score: Score) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), user_id, product_id, score, created_at: now, updated_at: now }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub text: String,
    pub status: ModerationStatus,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(user_id: Uuid, product_id: Uuid, text: &str) -> Result<Self, ReviewError> {
        let text = clean_text(text)?;
        Ok(Self { id: Uuid::now_v7(), user_id, product_id, text, status: ModerationStatus::Pending, created_at: Utc::now() })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductReview {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub rating: Score,
    pub comment: Option<String>,
    pub status: ModerationStatus,
    pub created_at: DateTime<Utc>,
}

impl ProductReview {
    /// Reviews without text need no moderation.
    pub fn new(user_id: Uuid, product_id: Uuid, rating: Score, comment: Option<&str>) -> Result<Self, ReviewError> {
        let comment = match comment.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => Some(clean_text(c)?),
            None => None,
        };
        let status = if comment.is_some() { ModerationStatus::Pending } else { ModerationStatus::Approved };
        Ok(Self { id: Uuid::now_v7(), user_id, product_id, rating, comment, status, created_at: Utc::now() })
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
}

impl RatingSummary {
    pub fn from_scores(scores: impl IntoIterator<Item = Score>) -> Self {
        let (sum, count) = scores.into_iter().fold((0i64, 0i64), |(s, c), score| (s + i64::from(score.value()), c + 1));
        Self { average: (count > 0).then(|| sum as f64 / count as f64), count }
    }
}

fn clean_text(text: &str) -> Result<String, ReviewError> {
    let text = text.trim();
    check_text(text, 1, MAX_TEXT_LEN)?;
    Ok(escape_html(text))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("only customers who received this product can review it")]
    NotPurchased,
    #[error(transparent)]
    Text(#[from] TextError),
}
