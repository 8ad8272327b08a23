mod dates;
mod llm;
mod rule;
mod vocabulary;

use std::{fmt, str::FromStr, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use self::llm::{LlmExtractor, OllamaModel};
pub use self::rule::RuleExtractor;
pub use self::vocabulary::{OverlapPolicy, Vocabulary};
use crate::settings::{ExtractorSettings, LlmSettings, Strategy};

/// A report tab of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    #[serde(rename = "Sales Overview")]
    SalesOverview,
    #[serde(rename = "Product Performance")]
    ProductPerformance,
    #[serde(rename = "Customer Insights")]
    CustomerInsights,
    #[serde(rename = "Sales Forecasting")]
    SalesForecasting,
    #[serde(rename = "Regional Analysis")]
    RegionalAnalysis,
    #[serde(rename = "Order Analysis")]
    OrderAnalysis,
}

impl View {
    pub const ALL: [View; 6] = [
        View::SalesOverview,
        View::ProductPerformance,
        View::CustomerInsights,
        View::SalesForecasting,
        View::RegionalAnalysis,
        View::OrderAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::SalesOverview => "Sales Overview",
            View::ProductPerformance => "Product Performance",
            View::CustomerInsights => "Customer Insights",
            View::SalesForecasting => "Sales Forecasting",
            View::RegionalAnalysis => "Regional Analysis",
            View::OrderAnalysis => "Order Analysis",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        match View::ALL
            .into_iter()
            .find(|view| view.as_str().eq_ignore_ascii_case(wanted))
        {
            Some(view) => Ok(view),
            None => bail!("unknown view: {wanted}"),
        }
    }
}

/// Inclusive date window used when an utterance names no date at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for DateWindow {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid calendar date"),
            end: NaiveDate::from_ymd_opt(2023, 12, 31).expect("valid calendar date"),
        }
    }
}

/// Structured filter produced from one chat utterance.
///
/// `None` for `countries`, `categories` and `view` means the utterance did not
/// restrict that dimension. `end_date` is `None` only when exactly one date
/// boundary was found; the dashboard closes such a range at its newest order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub countries: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub view: Option<View>,
}

impl ParsedQuery {
    /// A query that only carries the given date window.
    pub fn unrestricted(window: DateWindow) -> Self {
        Self {
            countries: None,
            categories: None,
            start_date: window.start,
            end_date: Some(window.end),
            view: None,
        }
    }
}

/// Turns a free-text utterance into a [`ParsedQuery`].
///
/// Implementations never fail: input without any recognizable signal yields
/// [`ParsedQuery::unrestricted`] over the configured default window.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, utterance: &str) -> ParsedQuery;
}

/// Builds the extraction strategy selected in the settings.
pub fn build_extractor(extractor: &ExtractorSettings, llm: &LlmSettings) -> Box<dyn Extractor> {
    let window = DateWindow {
        start: extractor.default_start,
        end: extractor.default_end,
    };
    let rule = RuleExtractor::new(Arc::new(Vocabulary::default()), window, extractor.overlap);
    match extractor.strategy {
        Strategy::Rule => Box::new(rule),
        Strategy::Llm => {
            let model = OllamaModel::new(&llm.host, llm.port, &llm.model);
            Box::new(LlmExtractor::new(model, rule, llm.max_attempts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_names_round_trip() {
        for view in View::ALL {
            assert_eq!(view.to_string().parse::<View>().unwrap(), view);
        }
        assert_eq!(
            "order ANALYSIS".parse::<View>().unwrap(),
            View::OrderAnalysis
        );
        assert!("Inventory".parse::<View>().is_err());
    }

    #[test]
    fn view_serializes_as_canonical_name() {
        let json = serde_json::to_string(&View::CustomerInsights).unwrap();
        assert_eq!(json, "\"Customer Insights\"");
    }

    #[test]
    fn unrestricted_query_covers_default_window() {
        let query = ParsedQuery::unrestricted(DateWindow::default());
        assert_eq!(query.start_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(query.end_date, NaiveDate::from_ymd_opt(2023, 12, 31));
        assert!(query.countries.is_none());
        assert!(query.categories.is_none());
        assert!(query.view.is_none());
    }

    #[tokio::test]
    async fn rule_strategy_is_built_by_default() {
        let settings = crate::settings::Settings::from_defaults().unwrap();
        let extractor = build_extractor(&settings.extractor, &settings.llm);
        let query = extractor.extract("regional analysis for Spain in 2022").await;
        assert_eq!(query.countries, Some(vec!["Spain".to_string()]));
        assert_eq!(query.view, Some(View::RegionalAnalysis));
        assert_eq!(query.end_date, NaiveDate::from_ymd_opt(2022, 12, 31));
    }
}
