mod customer;
mod forecast;
mod order;
mod overview;
mod product;
mod regional;

use std::{collections::BTreeMap, fmt};

use chrono::{Datelike, NaiveDate};

pub use self::forecast::{Granularity, LinearTrend};
use crate::{auth::Role, dataset::Order, query::View, settings::ForecastSettings};

/// The number of rows in "top" rankings.
const TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub label: String,
    pub value: String,
}

/// A titled block of a report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub title: String,
    pub rows: Vec<Row>,
    pub notes: Vec<String>,
    /// Raw tables only administrators get to see.
    pub admin_only: bool,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    fn admin(title: impl Into<String>) -> Self {
        Self {
            admin_only: true,
            ..Self::new(title)
        }
    }

    fn row(mut self, label: impl Into<String>, value: impl fmt::Display) -> Self {
        self.rows.push(Row {
            label: label.into(),
            value: value.to_string(),
        });
        self
    }

    fn money_rows<K: fmt::Display>(self, rows: impl IntoIterator<Item = (K, f64)>) -> Self {
        rows.into_iter()
            .fold(self, |section, (label, value)| {
                section.row(label.to_string(), money(value))
            })
    }

    fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
impl Section {
    fn value(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.label == label)
            .map(|row| row.value.as_str())
    }
}

/// The aggregated content of one dashboard view.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub view: View,
    pub sections: Vec<Section>,
}

impl Report {
    pub fn title(&self) -> &'static str {
        self.view.as_str()
    }

    /// Sections visible to the given role.
    pub fn visible(&self, role: Role) -> impl Iterator<Item = &Section> {
        self.sections
            .iter()
            .filter(move |section| !section.admin_only || role == Role::Admin)
    }

    pub fn render(&self, role: Role) -> String {
        Rendered { report: self, role }.to_string()
    }
}

struct Rendered<'a> {
    report: &'a Report,
    role: Role,
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.report.title())?;
        for section in self.report.visible(self.role) {
            write!(f, "\n-- {} --\n", section.title)?;
            for row in &section.rows {
                writeln!(f, "{}: {}", row.label, row.value)?;
            }
            for note in &section.notes {
                writeln!(f, "! {note}")?;
            }
        }
        Ok(())
    }
}

/// Builds the report of `view` over the selected orders.
///
/// `product` picks the product whose daily trend the product view shows.
pub fn build(
    view: View,
    orders: &[&Order],
    forecast: &ForecastSettings,
    product: Option<&str>,
) -> Report {
    let sections = match view {
        View::SalesOverview => overview::sections(orders),
        View::ProductPerformance => product::sections(orders, product),
        View::CustomerInsights => customer::sections(orders),
        View::SalesForecasting => forecast::sections(orders, forecast, &LinearTrend),
        View::RegionalAnalysis => regional::sections(orders),
        View::OrderAnalysis => order::sections(orders),
    };
    Report { view, sections }
}

/// Formats an amount as `$1,234.56`.
pub fn money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cents = cents as u64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

fn sum_by<'a, K: Ord>(
    orders: &[&'a Order],
    key: impl Fn(&'a Order) -> K,
    value: impl Fn(&Order) -> f64,
) -> BTreeMap<K, f64> {
    orders.iter().fold(BTreeMap::new(), |mut totals, &order| {
        *totals.entry(key(order)).or_default() += value(order);
        totals
    })
}

/// Entries by descending value; ties keep key order.
fn descending<K>(totals: BTreeMap<K, f64>) -> Vec<(K, f64)> {
    let mut entries: Vec<_> = totals.into_iter().collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries
}

fn top<K>(totals: BTreeMap<K, f64>) -> Vec<(K, f64)> {
    let mut entries = descending(totals);
    entries.truncate(TOP_N);
    entries
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    fn of(date: NaiveDate) -> Self {
        match date.month() {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Fall,
            _ => Self::Winter,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// "a / b" labels for two-level groupings.
fn pair<A: fmt::Display, B: fmt::Display>((a, b): (A, B)) -> String {
    format!("{a} / {b}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::sample_dataset;

    pub(super) fn forecast_settings() -> ForecastSettings {
        ForecastSettings {
            periods: 3,
            granularity: Granularity::Monthly,
        }
    }

    #[test]
    fn money_groups_thousands() {
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1234.5), "$1,234.50");
        assert_eq!(money(1_234_567.891), "$1,234,567.89");
        assert_eq!(money(-40.0), "-$40.00");
        assert_eq!(money(-0.001), "$0.00");
        assert_eq!(money(999.999), "$1,000.00");
    }

    #[test]
    fn seasons_follow_months() {
        let season = |m| Season::of(NaiveDate::from_ymd_opt(2021, m, 1).unwrap());
        assert_eq!(season(12), Season::Winter);
        assert_eq!(season(2), Season::Winter);
        assert_eq!(season(3), Season::Spring);
        assert_eq!(season(8), Season::Summer);
        assert_eq!(season(11), Season::Fall);
    }

    #[test]
    fn descending_keeps_key_order_on_ties() {
        let totals = BTreeMap::from([("b", 1.0), ("a", 1.0), ("c", 5.0)]);
        assert_eq!(descending(totals), vec![("c", 5.0), ("a", 1.0), ("b", 1.0)]);
    }

    #[test]
    fn every_view_builds() {
        let dataset = sample_dataset();
        let orders: Vec<_> = dataset.orders().iter().collect();
        for view in View::ALL {
            let report = build(view, &orders, &forecast_settings(), None);
            assert_eq!(report.title(), view.as_str());
            assert!(!report.sections.is_empty(), "{view} has no sections");
        }
    }

    #[test]
    fn render_layout() {
        let report = Report {
            view: View::OrderAnalysis,
            sections: vec![
                Section::new("Totals").row("Orders", 2).note("Few orders."),
                Section::admin("Raw").row("O-1", money(5.0)),
            ],
        };
        assert_eq!(
            report.render(Role::Analyst),
            "== Order Analysis ==\n\n-- Totals --\nOrders: 2\n! Few orders.\n"
        );
        assert!(report.render(Role::Admin).ends_with("\n-- Raw --\nO-1: $5.00\n"));
    }

    #[test]
    fn admin_sections_are_hidden_from_other_roles() {
        let dataset = sample_dataset();
        let orders: Vec<_> = dataset.orders().iter().collect();
        let report = build(View::SalesOverview, &orders, &forecast_settings(), None);

        let admin = report.render(Role::Admin);
        let analyst = report.render(Role::Analyst);
        assert!(admin.contains("-- Daily Sales --"));
        assert!(!analyst.contains("-- Daily Sales --"));
        assert!(analyst.starts_with("== Sales Overview ==\n"));
        assert!(analyst.contains("Total Sales: $2,700.00\n"));
        assert_eq!(
            report.visible(Role::Viewer).count() + 1,
            report.visible(Role::Admin).count()
        );
    }
}
