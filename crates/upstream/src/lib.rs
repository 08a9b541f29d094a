//! HTTP side of a crawl: the product page and the three side-channel APIs.

mod client;
mod config;
mod price;
mod promotion;
mod tax;

use std::future::Future;

use model::{CrawlError, PageConfig, PriceQuote, ProductId, PromotionInfo};

pub use client::HttpUpstream;
pub use config::UpstreamConfig;
pub use price::{parse_price, price_url};
pub use promotion::{decode_promotion, promotion_url};
pub use tax::{parse_tax, tax_url, TAX_MARKER};

/// A decoded payload along with the text it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub raw: String,
}

pub trait Upstream: Send + Sync {
    /// Raw product page bytes, still in the site's legacy encoding.
    fn fetch_page(&self, id: ProductId)
        -> impl Future<Output = Result<Vec<u8>, CrawlError>> + Send;

    fn fetch_price(
        &self,
        config: &PageConfig,
    ) -> impl Future<Output = Result<Fetched<PriceQuote>, CrawlError>> + Send;

    fn fetch_promotion(
        &self,
        config: &PageConfig,
    ) -> impl Future<Output = Result<Fetched<PromotionInfo>, CrawlError>> + Send;

    /// Cross-border tax to add on top of the price; 0 for domestic items.
    fn fetch_tax(&self, id: ProductId) -> impl Future<Output = Result<f64, CrawlError>> + Send;
}
