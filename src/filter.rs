use anyhow::{bail, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::{
    dataset::{Dataset, Order},
    query::{ParsedQuery, View},
};

/// The dashboard's current selection.
///
/// Empty `countries` or `categories` select everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    countries: Vec<String>,
    categories: Vec<String>,
    /// Start of the order date range. (inclusive)
    start: NaiveDate,
    /// End of the order date range. (inclusive)
    end: NaiveDate,
    view: View,
    /// Product whose daily trend the product view shows.
    product: Option<String>,
}

impl FilterState {
    /// All countries and categories over the dataset's full date range.
    pub fn new(dataset: &Dataset) -> Self {
        Self {
            countries: Vec::new(),
            categories: Vec::new(),
            start: dataset.min_date(),
            end: dataset.max_date(),
            view: View::SalesOverview,
            product: None,
        }
    }

    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    /// Overwrites the selection with an extracted query.
    ///
    /// Values the dataset does not carry are dropped. An open end date closes
    /// at the newest order.
    pub fn apply(&mut self, query: &ParsedQuery, dataset: &Dataset) {
        self.countries = known(query.countries.as_deref(), dataset.countries());
        self.categories = known(query.categories.as_deref(), dataset.categories());
        self.start = query.start_date;
        self.end = query.end_date.unwrap_or_else(|| dataset.max_date());
        if let Some(view) = query.view {
            self.view = view;
        }
        info!("Filters updated: {self}");
    }

    pub fn set_countries(&mut self, countries: &[String], dataset: &Dataset) {
        self.countries = known(Some(countries), dataset.countries());
    }

    pub fn set_categories(&mut self, categories: &[String], dataset: &Dataset) {
        self.categories = known(Some(categories), dataset.categories());
    }

    pub fn set_dates(&mut self, start: NaiveDate, end: NaiveDate) {
        self.start = start;
        self.end = end;
    }

    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    /// Selects a product by case-insensitive name; an empty name clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset has no such product.
    pub fn set_product(&mut self, name: &str, dataset: &Dataset) -> Result<()> {
        if name.is_empty() {
            self.product = None;
            return Ok(());
        }
        let Some(product) = dataset
            .products()
            .iter()
            .find(|product| product.eq_ignore_ascii_case(name))
        else {
            bail!("Unknown product {name}.");
        };
        self.product = Some(product.clone());
        Ok(())
    }

    pub fn reset(&mut self, dataset: &Dataset) {
        *self = Self::new(dataset);
    }

    /// Orders matching the current selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the start and end dates are the same.
    pub fn select<'a>(&self, dataset: &'a Dataset) -> Result<Vec<&'a Order>> {
        if self.start == self.end {
            bail!("Start date and end date cannot be the same.");
        }
        let selected: Vec<_> = dataset
            .orders()
            .iter()
            .filter(|order| {
                (self.countries.is_empty() || self.countries.contains(&order.country))
                    && (self.categories.is_empty() || self.categories.contains(&order.category))
                    && order.order_date >= self.start
                    && order.order_date <= self.end
            })
            .collect();
        debug!("{} of {} orders selected", selected.len(), dataset.orders().len());
        Ok(selected)
    }
}

impl std::fmt::Display for FilterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let all = |values: &[String]| {
            if values.is_empty() {
                "all".to_string()
            } else {
                values.join(", ")
            }
        };
        write!(
            f,
            "countries: {}; categories: {}; dates: {} to {}; view: {}",
            all(self.countries()),
            all(self.categories()),
            self.start(),
            self.end(),
            self.view()
        )?;
        if let Some(product) = self.product() {
            write!(f, "; product: {product}")?;
        }
        Ok(())
    }
}

fn known(wanted: Option<&[String]>, available: &[String]) -> Vec<String> {
    wanted
        .unwrap_or_default()
        .iter()
        .filter_map(|value| {
            available
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(value))
                .cloned()
        })
        .fold(Vec::new(), |mut kept, value| {
            if !kept.contains(&value) {
                kept.push(value);
            }
            kept
        })
}
