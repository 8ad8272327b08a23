use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use super::{money, sum_by, top, Section, TOP_N};
use crate::dataset::Order;

const SEGMENTS: [&str; 4] = ["Low-Value", "Mid-Value", "High-Value", "Top-Value"];
const SINGLE_SEGMENT: &str = "Single Segment";

/// Recency, frequency and monetary value of one customer.
#[derive(Debug, Clone, PartialEq)]
struct Rfm<'a> {
    customer: &'a str,
    /// Days between the customer's last order and the newest selected order.
    recency: i64,
    frequency: usize,
    monetary: f64,
    segment: &'static str,
}

impl Rfm<'_> {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self) -> f64 {
        self.recency as f64 + self.frequency as f64 + self.monetary
    }
}

pub(super) fn sections(orders: &[&Order]) -> Vec<Section> {
    let rfm = rfm(orders);

    let mut segments = Section::new("Customer Segments");
    for label in SEGMENTS.iter().chain([&SINGLE_SEGMENT]) {
        let count = rfm.iter().filter(|r| r.segment == *label).count();
        if count > 0 {
            segments = segments.row(*label, count);
        }
    }

    let metrics = rfm.iter().take(TOP_N).fold(Section::admin("RFM Metrics"), |section, r| {
        section.row(
            r.customer,
            format!(
                "recency {} days, frequency {}, monetary {}, {}",
                r.recency,
                r.frequency,
                money(r.monetary),
                r.segment
            ),
        )
    });

    vec![
        Section::new("Top Customers by Sales")
            .money_rows(top(sum_by(orders, |o| o.customer_name.as_str(), |o| o.sales))),
        repeat_purchases(orders),
        segments,
        metrics,
    ]
}

/// Customers with more than one distinct order ID; lines of one order count once.
fn repeat_purchases(orders: &[&Order]) -> Section {
    let mut placed: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for order in orders {
        placed
            .entry(order.customer_key())
            .or_default()
            .insert(order.order_id.as_str());
    }
    let customers = placed.len();
    let repeat = placed.values().filter(|ids| ids.len() > 1).count();
    #[allow(clippy::cast_precision_loss)]
    let rate = if customers == 0 {
        0.0
    } else {
        repeat as f64 * 100.0 / customers as f64
    };
    Section::new("Repeat Purchases")
        .row("Customers", customers)
        .row("Repeat Customers", repeat)
        .row("Repeat Purchase Rate", format!("{rate:.1}%"))
}

/// RFM rows in customer name order, segmented by quartiles of the score rank.
fn rfm<'a>(orders: &[&'a Order]) -> Vec<Rfm<'a>> {
    let Some(newest) = orders.iter().map(|o| o.order_date).max() else {
        return Vec::new();
    };

    let mut totals: BTreeMap<&str, (NaiveDate, usize, f64)> = BTreeMap::new();
    for &order in orders {
        let entry = totals
            .entry(order.customer_name.as_str())
            .or_insert((order.order_date, 0, 0.0));
        entry.0 = entry.0.max(order.order_date);
        entry.1 += 1;
        entry.2 += order.sales;
    }

    let mut rows: Vec<_> = totals
        .into_iter()
        .map(|(customer, (last, frequency, monetary))| Rfm {
            customer,
            recency: (newest - last).num_days(),
            frequency,
            monetary,
            segment: SINGLE_SEGMENT,
        })
        .collect();

    let mut by_score: Vec<usize> = (0..rows.len()).collect();
    by_score.sort_by(|&a, &b| rows[a].score().total_cmp(&rows[b].score()));
    for (rank, &i) in by_score.iter().enumerate() {
        rows[i].segment = segment(rank, rows.len());
    }
    rows
}

/// Quartile label of a zero-based rank among `n` distinct ranks.
fn segment(rank: usize, n: usize) -> &'static str {
    if n < 2 {
        return SINGLE_SEGMENT;
    }
    // Smallest quartile whose upper edge `(n - 1) * q / 4` reaches the rank.
    let quartile = (4 * rank).div_ceil(n - 1).max(1);
    SEGMENTS[quartile - 1]
}
