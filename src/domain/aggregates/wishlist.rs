//! Wishlist entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub added_at: DateTime<Utc>,
}

impl WishlistEntry {
    pub fn new(user_id: Uuid, product_id: Uuid) -> Self { Self { user_id, product_id, added_at: Utc::now() } }
}
