//! Revenue and profit reporting over placed orders.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::aggregates::Order;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub cost: Decimal,
    pub profit: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RevenueReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub orders: usize,
    pub revenue: Decimal,
    pub cost: Decimal,
    pub profit: Decimal,
    pub daily: Vec<DailyRevenue>,
}

impl RevenueReport {
    /// Cancelled and refunded orders are left out; revenue is what customers
    /// paid after discounts and cost is the unit cost frozen at purchase.
    pub fn build(from: DateTime<Utc>, to: DateTime<Utc>, orders: &[Order]) -> Self {
        let mut daily: BTreeMap<NaiveDate, DailyRevenue> = BTreeMap::new();
        let mut count = 0;
        for order in orders.iter().filter(|o| o.status.is_settled_sale() && o.created_at >= from && o.created_at <= to) {
            count += 1;
            let date = order.created_at.date_naive();
            let day = daily.entry(date).or_insert_with(|| DailyRevenue { date, ..Default::default() });
            for item in &order.items {
                day.revenue += item.line_total();
                day.cost += item.line_cost();
            }
            day.profit = day.revenue - day.cost;
        }
        let revenue: Decimal = daily.values().map(|d| d.revenue).sum();
        let cost: Decimal = daily.values().map(|d| d.cost).sum();
        Self { from, to, orders: count, revenue, cost, profit: revenue - cost, daily: daily.into_values().collect() }
    }
}
