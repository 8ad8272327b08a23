use std::collections::BTreeMap;

use super::{money, sum_by, Section, TOP_N};
use crate::dataset::Order;

pub(super) fn sections(orders: &[&Order]) -> Vec<Section> {
    // Order lines per customer, then customers per line count.
    let per_customer = orders.iter().fold(BTreeMap::new(), |mut counts, order| {
        *counts.entry(order.customer_key()).or_insert(0_usize) += 1;
        counts
    });
    let distribution = per_customer
        .values()
        .fold(BTreeMap::new(), |mut customers, count| {
            *customers.entry(*count).or_insert(0_usize) += 1;
            customers
        });
    let frequency = distribution
        .into_iter()
        .fold(Section::new("Order Frequency"), |section, (count, customers)| {
            let unit = if count == 1 { "order" } else { "orders" };
            section.row(format!("Customers with {count} {unit}"), customers)
        });

    let values = sum_by(orders, |o| o.order_id.as_str(), |o| o.sales);
    let mut order_value = Section::new("Order Value");
    if let (Some(min), Some(max)) = (
        values.values().copied().reduce(f64::min),
        values.values().copied().reduce(f64::max),
    ) {
        #[allow(clippy::cast_precision_loss)]
        let average = values.values().sum::<f64>() / values.len() as f64;
        order_value = order_value
            .row("Orders", values.len())
            .row("Average Order Value", money(average))
            .row("Smallest Order", money(min))
            .row("Largest Order", money(max));
    }

    vec![
        frequency,
        order_value,
        Section::admin("Order Values").money_rows(values.into_iter().take(TOP_N)),
    ]
}
