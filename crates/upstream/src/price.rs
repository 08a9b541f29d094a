use chrono::Utc;
use model::{CrawlError, PriceQuote};

use crate::UpstreamConfig;

/// Each request carries a fresh `pduid` so the endpoint does not serve a
/// cached quote.
pub fn price_url(config: &UpstreamConfig, sku_id: i64) -> String {
    let nonce = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!(
        "{}?area={}&pduid={nonce}&skuIds=J_{sku_id}",
        config.price_endpoint, config.area
    )
}

/// The endpoint answers with an array, one entry per requested SKU.
pub fn parse_price(body: &[u8]) -> Result<PriceQuote, CrawlError> {
    let quotes: Vec<PriceQuote> =
        serde_json::from_slice(body).map_err(|err| CrawlError::Decode(format!("price: {err}")))?;
    quotes
        .into_iter()
        .next()
        .ok_or_else(|| CrawlError::Decode("price: empty quote list".into()))
}
