use std::{fmt, iter};

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{money, sum_by, Section};
use crate::{dataset::Order, settings::ForecastSettings};

/// Bucket size of the sales history and the forecast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    /// First day of the bucket holding `date`. Weeks start on Monday.
    pub fn bucket(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => Some(date),
            Self::Weekly => date.checked_sub_days(Days::new(u64::from(
                date.weekday().num_days_from_monday(),
            ))),
            Self::Monthly => date.with_day(1),
        }
        .unwrap_or(date)
    }

    /// The bucket following the one starting at `date`.
    pub fn next(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => date.checked_add_days(Days::new(1)),
            Self::Weekly => date.checked_add_days(Days::new(7)),
            Self::Monthly => date.checked_add_months(Months::new(1)),
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Self::Daily => "Day",
            Self::Weekly => "Week",
            Self::Monthly => "Month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Predicts future bucket totals from bucketed history.
pub trait Forecaster {
    /// `periods` points following the last bucket of `history`, which is
    /// sorted by date and holds at least one point.
    fn forecast(
        &self,
        history: &[(NaiveDate, f64)],
        granularity: Granularity,
        periods: usize,
    ) -> Vec<(NaiveDate, f64)>;
}

/// Least-squares line through the history, with days as the x axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrend;

impl Forecaster for LinearTrend {
    #[allow(clippy::cast_precision_loss)]
    fn forecast(
        &self,
        history: &[(NaiveDate, f64)],
        granularity: Granularity,
        periods: usize,
    ) -> Vec<(NaiveDate, f64)> {
        let (Some(&(first, _)), Some(&(last, _))) = (history.first(), history.last()) else {
            return Vec::new();
        };
        let x = |date: NaiveDate| (date - first).num_days() as f64;

        let n = history.len() as f64;
        let mean_x = history.iter().map(|(d, _)| x(*d)).sum::<f64>() / n;
        let mean_y = history.iter().map(|(_, y)| y).sum::<f64>() / n;
        let (covariance, variance) = history.iter().fold((0.0, 0.0), |(cov, var), (d, y)| {
            let dx = x(*d) - mean_x;
            (cov + dx * (y - mean_y), var + dx * dx)
        });
        let slope = if variance == 0.0 { 0.0 } else { covariance / variance };
        let intercept = mean_y - slope * mean_x;
        debug!("Linear trend: slope {slope:.4}/day, intercept {intercept:.2}");

        iter::successors(granularity.next(last), |d| granularity.next(*d))
            .take(periods)
            .map(|d| (d, intercept + slope * x(d)))
            .collect()
    }
}

pub(super) fn sections(
    orders: &[&Order],
    settings: &ForecastSettings,
    forecaster: &dyn Forecaster,
) -> Vec<Section> {
    if orders.len() < 2 {
        return vec![Section::new("Forecast Summary")
            .note("Not enough data for forecasting. At least 2 rows of data are required.")];
    }

    let granularity = settings.granularity;
    let history: Vec<_> = sum_by(orders, |o| granularity.bucket(o.order_date), |o| o.sales)
        .into_iter()
        .collect();
    let points = forecaster.forecast(&history, granularity, settings.periods);

    let total: f64 = points.iter().map(|(_, y)| y).sum();
    let mut summary = Section::new("Forecast Summary")
        .row("Granularity", granularity)
        .row("Periods", points.len())
        .row("Total Forecasted Sales", money(total));
    if !points.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let average = total / points.len() as f64;
        summary = summary.row(format!("Average Sales per {}", granularity.unit()), money(average));
    }

    vec![
        summary,
        Section::new("Forecasted Sales").money_rows(points),
        Section::admin("Historical Sales").money_rows(history),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dataset::sample_dataset, report::tests::forecast_settings};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Flat(f64);

    impl Forecaster for Flat {
        fn forecast(
            &self,
            history: &[(NaiveDate, f64)],
            granularity: Granularity,
            periods: usize,
        ) -> Vec<(NaiveDate, f64)> {
            let last = history.last().unwrap().0;
            iter::successors(granularity.next(last), |d| granularity.next(*d))
                .take(periods)
                .map(|d| (d, self.0))
                .collect()
        }
    }

    #[test]
    fn buckets() {
        // 2021-01-07 is a Thursday.
        assert_eq!(Granularity::Daily.bucket(date(2021, 1, 7)), date(2021, 1, 7));
        assert_eq!(Granularity::Weekly.bucket(date(2021, 1, 7)), date(2021, 1, 4));
        assert_eq!(Granularity::Weekly.bucket(date(2021, 1, 4)), date(2021, 1, 4));
        assert_eq!(Granularity::Monthly.bucket(date(2021, 1, 7)), date(2021, 1, 1));
        assert_eq!(Granularity::Monthly.next(date(2021, 12, 1)), Some(date(2022, 1, 1)));
        assert_eq!(Granularity::Weekly.next(date(2021, 1, 4)), Some(date(2021, 1, 11)));
    }

    #[test]
    fn linear_trend_extends_a_line() {
        let history = [
            (date(2021, 1, 1), 10.0),
            (date(2021, 1, 2), 20.0),
            (date(2021, 1, 4), 40.0),
        ];
        let points = LinearTrend.forecast(&history, Granularity::Daily, 2);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].0, date(2021, 1, 5));
        assert!((points[0].1 - 50.0).abs() < 1e-9);
        assert!((points[1].1 - 60.0).abs() < 1e-9);
    }

    #[test]
    fn single_bucket_forecasts_its_value() {
        let history = [(date(2021, 3, 1), 75.0)];
        let points = LinearTrend.forecast(&history, Granularity::Monthly, 3);
        assert_eq!(
            points,
            vec![
                (date(2021, 4, 1), 75.0),
                (date(2021, 5, 1), 75.0),
                (date(2021, 6, 1), 75.0),
            ]
        );
        assert!(LinearTrend.forecast(&[], Granularity::Daily, 3).is_empty());
    }

    #[test]
    fn sections_summarize_the_forecast() {
        let dataset = sample_dataset();
        let orders: Vec<_> = dataset.orders().iter().collect();
        let sections = sections(&orders, &forecast_settings(), &Flat(100.0));

        let summary = &sections[0];
        assert_eq!(summary.value("Granularity"), Some("Monthly"));
        assert_eq!(summary.value("Periods"), Some("3"));
        assert_eq!(summary.value("Total Forecasted Sales"), Some("$300.00"));
        assert_eq!(summary.value("Average Sales per Month"), Some("$100.00"));

        let dates: Vec<_> = sections[1].rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(dates, ["2023-01-01", "2023-02-01", "2023-03-01"]);

        let history = &sections[2];
        assert!(history.admin_only);
        assert_eq!(history.rows.len(), 8);
        assert_eq!(history.value("2021-01-01"), Some("$500.00"));
    }

    #[test]
    fn too_few_orders() {
        let dataset = sample_dataset();
        let orders: Vec<_> = dataset.orders().iter().take(1).collect();
        let sections = sections(&orders, &forecast_settings(), &LinearTrend);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].rows.is_empty());
        assert_eq!(sections[0].notes.len(), 1);
    }
}
