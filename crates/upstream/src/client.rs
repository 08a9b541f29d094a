use model::{decode_gbk, CrawlError, PageConfig, PriceQuote, ProductId, PromotionInfo};
use reqwest::Client;
use tracing::debug;

use crate::{
    decode_promotion, parse_price, parse_tax, price_url, promotion_url, tax_url, Fetched,
    Upstream, UpstreamConfig,
};

#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
    config: UpstreamConfig,
}

impl HttpUpstream {
    pub fn new(config: UpstreamConfig) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|err| CrawlError::fetch("client", err))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, CrawlError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| CrawlError::fetch(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::fetch(url, format!("HTTP {status}")));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| CrawlError::fetch(url, err))?;
        debug!(url, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }
}

impl Upstream for HttpUpstream {
    async fn fetch_page(&self, id: ProductId) -> Result<Vec<u8>, CrawlError> {
        self.get(&self.config.page_url(id)).await
    }

    async fn fetch_price(&self, config: &PageConfig) -> Result<Fetched<PriceQuote>, CrawlError> {
        let body = self.get(&price_url(&self.config, config.sku_id)).await?;
        let value = parse_price(&body)?;
        Ok(Fetched {
            value,
            raw: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    async fn fetch_promotion(
        &self,
        config: &PageConfig,
    ) -> Result<Fetched<PromotionInfo>, CrawlError> {
        let body = self.get(&promotion_url(&self.config, config)).await?;
        let raw = decode_gbk(&body, "promotion")?;
        let value = decode_promotion(&raw)?;
        Ok(Fetched { value, raw })
    }

    async fn fetch_tax(&self, id: ProductId) -> Result<f64, CrawlError> {
        let body = self.get(&tax_url(&self.config, id)).await?;
        parse_tax(&decode_gbk(&body, "tax")?)
    }
}
