use chrono::{DateTime, Utc};

use crate::auth::AuthUser;
use crate::domain::aggregates::Role;
use crate::domain::reports::RevenueReport;
use crate::{AppState, EcommerceError, Result};

pub async fn revenue_report(state: &AppState, auth: &AuthUser, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<RevenueReport> {
    auth.require(Role::SalesManager)?;
    if from > to { return Err(EcommerceError::Validation("`from` must not be after `to`".into())); }
    let orders = state.store.orders_between(from, to).await?;
    Ok(RevenueReport::build(from, to, &orders))
}
