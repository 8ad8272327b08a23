use std::{collections::BTreeSet, fs, io::Read, path::Path};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One order line of the merchant dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Order {
    #[serde(rename = "Order.ID")]
    pub order_id: String,
    #[serde(rename = "Order.Date", deserialize_with = "deserialize_order_date")]
    pub order_date: NaiveDate,
    #[serde(rename = "Customer.ID", default)]
    pub customer_id: String,
    #[serde(rename = "Customer.Name")]
    pub customer_name: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Sub-Category", default)]
    pub sub_category: String,
    #[serde(rename = "Product.ID", default)]
    pub product_id: String,
    #[serde(rename = "Product Name", default)]
    pub product_name: String,
    #[serde(rename = "Sales")]
    pub sales: f64,
    #[serde(rename = "Profit", default)]
    pub profit: f64,
    #[serde(rename = "Quantity", default)]
    pub quantity: u32,
    #[serde(rename = "Shipping.Cost", default)]
    pub shipping_cost: f64,
}

impl Order {
    /// Customer identity used for grouping; falls back to the name.
    pub fn customer_key(&self) -> &str {
        if self.customer_id.is_empty() {
            &self.customer_name
        } else {
            &self.customer_id
        }
    }

    /// Product label used in rankings; falls back to the ID.
    pub fn product(&self) -> &str {
        if self.product_name.is_empty() {
            &self.product_id
        } else {
            &self.product_name
        }
    }
}

fn deserialize_order_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_order_date(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {s}")))
}

fn parse_order_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// The loaded order dataset and its distinct filter values.
#[derive(Debug, Clone)]
pub struct Dataset {
    orders: Vec<Order>,
    countries: Vec<String>,
    categories: Vec<String>,
    products: Vec<String>,
    min_date: NaiveDate,
    max_date: NaiveDate,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open dataset {}", path.display()))?;
        let dataset = Self::from_reader(file)
            .with_context(|| format!("Failed to load dataset {}", path.display()))?;
        info!(
            "Loaded {} orders from {} ({} .. {})",
            dataset.orders.len(),
            path.display(),
            dataset.min_date,
            dataset.max_date
        );
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let text = text.trim_start_matches('\u{FEFF}');

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut orders = Vec::new();
        for (line, record) in csv_reader.deserialize::<Order>().enumerate() {
            match record {
                Ok(order) => orders.push(order),
                Err(e) => warn!("Skipping malformed order row {}: {}", line + 1, e),
            }
        }
        Self::from_orders(orders)
    }

    pub fn from_orders(orders: Vec<Order>) -> Result<Self> {
        let (Some(min_date), Some(max_date)) = (
            orders.iter().map(|o| o.order_date).min(),
            orders.iter().map(|o| o.order_date).max(),
        ) else {
            bail!("Dataset contains no orders");
        };
        let countries = distinct(orders.iter().map(|o| o.country.as_str()));
        let categories = distinct(orders.iter().map(|o| o.category.as_str()));
        let products = distinct(orders.iter().map(Order::product));
        Ok(Self {
            orders,
            countries,
            categories,
            products,
            min_date,
            max_date,
        })
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn min_date(&self) -> NaiveDate {
        self.min_date
    }

    pub fn max_date(&self) -> NaiveDate {
        self.max_date
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) const SAMPLE_CSV: &str = "\
Order.ID,Order.Date,Customer.ID,Customer.Name,Country,Category,Sub-Category,Product.ID,Product Name,Sales,Profit,Quantity,Shipping.Cost
O-1,2021-01-05,C-1,Alice,France,Furniture,Chairs,P-1,Desk Chair,200.00,20.00,2,10.00
O-1,2021-01-05,C-1,Alice,France,Technology,Phones,P-2,Phone,300.00,60.00,1,15.00
O-2,2021-03-10,C-2,Bob,Germany,Office Supplies,Paper,P-3,Copy Paper,50.00,5.00,5,2.00
O-3,2021-07-20,C-1,Alice,Germany,Technology,Phones,P-2,Phone,300.00,60.00,1,12.00
O-4,2021-11-02,C-3,Carol,Japan,Furniture,Tables,P-4,Table,800.00,-40.00,1,40.00
O-5,2022-02-14,C-4,Dan,France,Office Supplies,Binders,P-5,Binder,20.00,8.00,4,1.00
O-6,2022-06-30,C-2,Bob,Germany,Technology,Machines,P-6,Printer,600.00,90.00,1,30.00
O-7,2022-09-09,C-5,Eve,Japan,Office Supplies,Paper,P-3,Copy Paper,30.00,3.00,3,2.00
O-8,2022-12-31,C-3,Carol,Japan,Technology,Phones,P-2,Phone,250.00,50.00,1,11.00
O-9,2022-12-31,C-4,Dan,France,Furniture,Chairs,P-1,Desk Chair,150.00,15.00,1,9.00
";

/// Ten order lines over 2021-01-05 ..= 2022-12-31 in France, Germany and Japan.
#[cfg(test)]
pub(crate) fn sample_dataset() -> Dataset {
    Dataset::from_reader(SAMPLE_CSV.as_bytes()).unwrap()
}
