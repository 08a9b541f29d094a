//! Push delivery over the gateway's plain HTTP interface.

use std::time::Duration;

use model::{CrawlError, NotificationGateway, ProductId};
use reqwest::Client;
use tracing::debug;

pub const DEFAULT_PUSH_ENDPOINT: &str = "http://localhost/push";

/// Text sent to subscribers when a product reaches a new or repeated low.
pub fn push_message(name: &str, price: f64, id: ProductId) -> String {
    format!("{name}降价至{price:.2} https://item.jd.com/{id}.html")
}

#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CrawlError> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CrawlError::Delivery(err.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl NotificationGateway for HttpNotifier {
    async fn deliver(&self, subscriber: &str, message: &str) -> Result<(), CrawlError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id", subscriber), ("message", message)])
            .send()
            .await
            .map_err(|err| CrawlError::Delivery(format!("{subscriber}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Delivery(format!("{subscriber}: HTTP {status}")));
        }
        debug!(subscriber, "push delivered");
        Ok(())
    }
}
