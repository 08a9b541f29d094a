use std::time::Duration;

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub page_base: String,
    pub price_endpoint: String,
    pub promotion_endpoint: String,
    pub tax_endpoint: String,
    /// Delivery area code sent with price and promotion lookups.
    pub area: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            page_base: "https://item.jd.com".into(),
            price_endpoint: "https://p.3.cn/prices/mgets".into(),
            promotion_endpoint: "https://cd.jd.com/promotion/v2".into(),
            tax_endpoint: "https://c.3.cn/globalBuy".into(),
            area: "7_412_47301_0".into(),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("price-tracker/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl UpstreamConfig {
    pub fn page_url(&self, id: i64) -> String {
        format!("{}/{id}.html", self.page_base)
    }
}
