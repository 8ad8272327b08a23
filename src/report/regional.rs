use std::collections::BTreeMap;

use chrono::Datelike;

use super::{descending, money, pair, sum_by, Section, TOP_N};
use crate::dataset::Order;

pub(super) fn sections(orders: &[&Order]) -> Vec<Section> {
    let by_category = sum_by(
        orders,
        |o| (o.country.as_str(), o.category.as_str()),
        |o| o.sales,
    );
    let by_month = sum_by(
        orders,
        |o| (o.country.as_str(), o.order_date.month()),
        |o| o.sales,
    );

    vec![
        Section::new("Sales by Country")
            .money_rows(descending(sum_by(orders, |o| o.country.as_str(), |o| o.sales))),
        Section::new("Sales by Country and Category")
            .money_rows(by_category.into_iter().map(|(k, v)| (pair(k), v))),
        average_shipping(orders),
        top_products(orders),
        Section::new("Profit by Country")
            .money_rows(descending(sum_by(orders, |o| o.country.as_str(), |o| o.profit))),
        Section::new("Monthly Sales by Country")
            .money_rows(by_month.into_iter().map(|(k, v)| (pair(k), v))),
    ]
}

/// Best-selling product IDs of each country, as "country / product".
fn top_products(orders: &[&Order]) -> Section {
    let totals = sum_by(
        orders,
        |o| {
            let product = if o.product_id.is_empty() {
                o.product()
            } else {
                o.product_id.as_str()
            };
            (o.country.as_str(), product)
        },
        |o| o.sales,
    );
    let mut ranked: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
    for ((country, product), sales) in descending(totals) {
        let products = ranked.entry(country).or_default();
        if products.len() < TOP_N {
            products.push((product, sales));
        }
    }
    Section::new("Top Products by Country").money_rows(ranked.into_iter().flat_map(
        |(country, products)| {
            products
                .into_iter()
                .map(move |(product, sales)| (pair((country, product)), sales))
        },
    ))
}

fn average_shipping(orders: &[&Order]) -> Section {
    let mut costs: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for &order in orders {
        let entry = costs.entry(order.country.as_str()).or_default();
        entry.0 += order.shipping_cost;
        entry.1 += 1;
    }
    costs
        .into_iter()
        .fold(Section::new("Average Shipping Cost"), |section, (country, (total, n))| {
            #[allow(clippy::cast_precision_loss)]
            let average = total / n as f64;
            section.row(country, money(average))
        })
}
