use std::future::Future;

use crate::{CrawlError, ProductId, TrackedProduct};

/// Stored price boundaries used to hydrate a cache entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundaries {
    pub min_price: f64,
    pub max_price: f64,
    pub inserted_at: i64,
    /// Number of crawl-history rows already recorded.
    pub samples: i64,
}

/// One changed observation, with the raw upstream payloads kept for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub product_id: ProductId,
    pub price: f64,
    pub content: String,
    pub price_payload: String,
    pub promotion_payload: String,
    pub page_config: String,
}

/// Relational store operations consumed by the tracker.
pub trait PersistenceGateway: Send + Sync {
    /// `Ok(None)` when the product is not registered.
    fn load_boundaries(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Boundaries>, CrawlError>> + Send;

    fn update_min_price(
        &self,
        id: ProductId,
        price: f64,
    ) -> impl Future<Output = Result<(), CrawlError>> + Send;

    fn update_max_price(
        &self,
        id: ProductId,
        price: f64,
    ) -> impl Future<Output = Result<(), CrawlError>> + Send;

    fn insert_history(&self, row: &HistoryRow)
        -> impl Future<Output = Result<(), CrawlError>> + Send;

    fn subscribers(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Vec<String>, CrawlError>> + Send;

    /// Returns false when the product already existed.
    fn insert_product(
        &self,
        id: ProductId,
        interval_secs: u64,
    ) -> impl Future<Output = Result<bool, CrawlError>> + Send;

    fn remove_product(&self, id: ProductId) -> impl Future<Output = Result<(), CrawlError>> + Send;

    fn list_products(&self) -> impl Future<Output = Result<Vec<TrackedProduct>, CrawlError>> + Send;
}

/// Outbound push transport. Fire and forget: no receipt is observed.
pub trait NotificationGateway: Send + Sync {
    fn deliver(
        &self,
        subscriber: &str,
        message: &str,
    ) -> impl Future<Output = Result<(), CrawlError>> + Send;
}
