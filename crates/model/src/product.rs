use serde::{Deserialize, Serialize};

pub type ProductId = i64;

/// A product in the registry, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProduct {
    pub product_id: ProductId,
    pub interval_secs: u64,
    pub min_price: f64,
    pub max_price: f64,
    /// Unix seconds of the first registration.
    pub inserted_at: i64,
}

/// In-memory tracking state for one product.
///
/// `min_price`/`max_price` use 0 for "not yet initialised".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub product_id: ProductId,
    pub name: String,
    /// Last accepted effective price, `None` until the first sample after
    /// hydration.
    pub price: Option<f64>,
    pub content: String,
    pub min_price: f64,
    pub max_price: f64,
    /// Display timestamp of the last accepted sample (`MM-DD HH:MM:SS`).
    pub updated_at: String,
    pub samples: i64,
    pub inserted_at: i64,
    /// Time since registration, filled in when the record is queried.
    #[serde(default)]
    pub elapsed: String,
}

impl PriceRecord {
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            name: String::new(),
            price: None,
            content: String::new(),
            min_price: 0.0,
            max_price: 0.0,
            updated_at: String::new(),
            samples: 0,
            inserted_at: 0,
            elapsed: String::new(),
        }
    }

    /// Currently sitting on its historical floor, with some spread observed.
    pub fn is_min_price(&self) -> bool {
        self.min_price != self.max_price && self.price == Some(self.min_price)
    }
}

/// Values read from a product page's embedded `pageConfig` literal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageConfig {
    pub sku_id: i64,
    pub name: String,
    /// Flash-sale window in epoch millis, 0 when not applicable.
    pub ko_begin_time: i64,
    pub ko_end_time: i64,
    pub image_url: String,
    pub categories: Vec<i64>,
}

impl PageConfig {
    /// Category ids joined with commas, as the promotion endpoint expects.
    pub fn joined_categories(&self) -> String {
        self.categories
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Renders elapsed seconds the way the dashboard always showed them:
/// `45s`, `2m5s`, `3h0m7s`.
pub fn format_elapsed(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}
