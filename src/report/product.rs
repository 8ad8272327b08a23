use std::collections::BTreeMap;

use super::{descending, pair, sum_by, top, Season, Section};
use crate::dataset::Order;

pub(super) fn sections(orders: &[&Order], selected: Option<&str>) -> Vec<Section> {
    let by_sales = top(sum_by(orders, Order::product, |o| o.sales));
    let by_profit = top(sum_by(orders, Order::product, |o| o.profit));
    let by_sub_category = sum_by(
        orders,
        |o| (o.category.as_str(), o.sub_category.as_str()),
        |o| o.sales,
    );
    let by_season = sum_by(
        orders,
        |o| (Season::of(o.order_date), o.category.as_str()),
        |o| o.sales,
    );

    vec![
        Section::new("Top-Selling Products by Sales").money_rows(by_sales),
        Section::new("Most Profitable Products").money_rows(by_profit),
        trend(orders, selected),
        Section::new("Sales by Category and Sub-Category")
            .money_rows(by_sub_category.into_iter().map(|(k, v)| (pair(k), v))),
        Section::new("Seasonal Sales by Category")
            .money_rows(by_season.into_iter().map(|(k, v)| (pair(k), v))),
        Section::new("Most Sold Category by Country").money_rows(leading_category(orders)),
    ]
}

/// Daily sales of one product, by default the first one in the selection.
fn trend(orders: &[&Order], selected: Option<&str>) -> Section {
    let Some(name) = selected.or_else(|| orders.first().map(|o| o.product())) else {
        return Section::new("Product Sales Trend");
    };
    let sold: Vec<_> = orders
        .iter()
        .copied()
        .filter(|o| o.product() == name)
        .collect();
    let section = Section::new(format!("Sales Trend for {name}"));
    if sold.is_empty() {
        return section.note(format!("No sales of {name} for the selected filters."));
    }
    section.money_rows(sum_by(&sold, |o| o.order_date, |o| o.sales))
}

/// The best-selling category of each country, as "country / category".
fn leading_category(orders: &[&Order]) -> Vec<(String, f64)> {
    let totals = sum_by(
        orders,
        |o| (o.country.as_str(), o.category.as_str()),
        |o| o.sales,
    );
    let mut leaders: BTreeMap<&str, (&str, f64)> = BTreeMap::new();
    for ((country, category), sales) in descending(totals) {
        leaders.entry(country).or_insert((category, sales));
    }
    leaders
        .into_iter()
        .map(|(country, (category, sales))| (pair((country, category)), sales))
        .collect()
}
