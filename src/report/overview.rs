use super::{descending, money, sum_by, Section};
use crate::dataset::Order;

pub(super) fn sections(orders: &[&Order]) -> Vec<Section> {
    let daily = sum_by(orders, |o| o.order_date, |o| o.sales);
    if daily.is_empty() {
        return vec![Section::new("Key Metrics").note("No sales data available for the selected filters.")];
    }

    let total: f64 = daily.values().sum();
    #[allow(clippy::cast_precision_loss)]
    let average = total / daily.len() as f64;
    let mut metrics = Section::new("Key Metrics")
        .row("Total Sales", money(total))
        .row("Average Sales (per Day)", money(average))
        .row("Total Orders", orders.len())
        .row("Units Sold", orders.iter().map(|o| o.quantity).sum::<u32>());
    if daily.values().any(|sales| *sales == 0.0) {
        metrics = metrics.note("Sales are 0 for one or more days in the selected date range.");
    }
    if daily.len() == 1 {
        metrics = metrics.note("All sales occur on the same date.");
    }

    vec![
        metrics,
        Section::new("Sales by Category")
            .money_rows(descending(sum_by(orders, |o| o.category.as_str(), |o| o.sales))),
        Section::new("Sales by Country")
            .money_rows(descending(sum_by(orders, |o| o.country.as_str(), |o| o.sales))),
        Section::admin("Daily Sales").money_rows(daily),
    ]
}
