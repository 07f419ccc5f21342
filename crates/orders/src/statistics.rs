use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderStatus};

/// Inclusive date filter on the day an order was placed (UTC).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from.is_none_or(|from| day >= from) && self.to.is_none_or(|to| day <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderStatistics {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub reserved_orders: u64,
    pub fulfilled_orders: u64,
    pub rejected_orders: u64,
    pub cancelled_orders: u64,
    pub units_shipped: i64,
    /// Placement value of fulfilled orders, smallest currency unit.
    pub revenue: u64,
    /// `revenue` per fulfilled order, rounded.
    pub average_order_value: u64,
    /// Percent of orders fulfilled, one decimal.
    pub completion_rate: f64,
    /// Percent of orders cancelled, one decimal.
    pub cancellation_rate: f64,
}

impl OrderStatistics {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>, range: DateRange) -> Self {
        let mut stats = Self::default();

        for order in orders {
            if !range.contains(order.placed_at().date_naive()) {
                continue;
            }
            stats.total_orders += 1;
            match order.status() {
                OrderStatus::Pending => stats.pending_orders += 1,
                OrderStatus::Reserved => stats.reserved_orders += 1,
                OrderStatus::Fulfilled => {
                    stats.fulfilled_orders += 1;
                    stats.revenue = stats.revenue.saturating_add(order.total_amount());
                }
                OrderStatus::Rejected => stats.rejected_orders += 1,
                OrderStatus::Cancelled => stats.cancelled_orders += 1,
            }
            stats.units_shipped += order.shipped_units();
        }

        if stats.fulfilled_orders > 0 {
            stats.average_order_value = (stats.revenue as f64 / stats.fulfilled_orders as f64)
                .round() as u64;
        }
        stats.completion_rate = percent(stats.fulfilled_orders, stats.total_orders);
        stats.cancellation_rate = percent(stats.cancelled_orders, stats.total_orders);
        stats
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}
