use std::fmt;
use std::sync::Arc;

use discount::DiscountEngine;
use metrics::CrawlMetrics;
use model::{CrawlError, HistoryRow, NotificationGateway, PersistenceGateway, ProductId};
use notify::push_message;
use page_config::ConfigExtractor;
use price_cache::PriceCache;
use thiserror::Error;
use tracing::{debug, info, warn};
use upstream::Upstream;

/// Pipeline step a crawl was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Page,
    Extract,
    Price,
    Promotion,
    Tax,
    Cache,
    History,
    Notify,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Page => "page",
            Stage::Extract => "extract",
            Stage::Price => "price",
            Stage::Promotion => "promotion",
            Stage::Tax => "tax",
            Stage::Cache => "cache",
            Stage::History => "history",
            Stage::Notify => "notify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("product {product_id} failed at {stage}: {error}")]
pub struct CrawlFailure {
    pub product_id: ProductId,
    pub stage: Stage,
    #[source]
    pub error: CrawlError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrawlOutcome {
    /// Same price and content as last time; nothing was written.
    Unchanged,
    /// Another crawl of the product was running, so this one never started.
    Skipped,
    Recorded {
        price: f64,
        push: bool,
        /// Subscribers that accepted the push.
        delivered: usize,
    },
}

/// Price strings come as decimal text, `-1.00` for delisted SKUs.
pub fn parse_amount(text: &str) -> Result<f64, CrawlError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| CrawlError::Decode(format!("price `{text}` is not a number")))
}

pub struct Spider<U, E, S, N> {
    upstream: U,
    extractor: E,
    engine: DiscountEngine,
    cache: Arc<PriceCache<S>>,
    store: Arc<S>,
    notifier: N,
    metrics: CrawlMetrics,
}

impl<U, E, S, N> Spider<U, E, S, N>
where
    U: Upstream,
    E: ConfigExtractor,
    S: PersistenceGateway,
    N: NotificationGateway,
{
    pub fn new(
        upstream: U,
        extractor: E,
        engine: DiscountEngine,
        store: Arc<S>,
        notifier: N,
        metrics: CrawlMetrics,
    ) -> Self {
        let cache = Arc::new(PriceCache::new(store.clone()));
        Self {
            upstream,
            extractor,
            engine,
            cache,
            store,
            notifier,
            metrics,
        }
    }

    pub fn cache(&self) -> &PriceCache<S> {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> &CrawlMetrics {
        &self.metrics
    }

    /// One full pass for a product. Failures are logged and counted here;
    /// callers only decide what to do with the product afterwards.
    pub async fn crawl(&self, id: ProductId) -> Result<CrawlOutcome, CrawlFailure> {
        self.metrics.crawl_started();
        let result = self.run(id).await;
        match &result {
            Ok(CrawlOutcome::Unchanged) => self.metrics.duplicate_sample(),
            Ok(_) => {}
            Err(failure) => {
                self.metrics.crawl_failed(failure.stage.as_str());
                warn!(
                    product_id = id,
                    stage = %failure.stage,
                    error = %failure.error,
                    "crawl failed"
                );
            }
        }
        result
    }

    async fn run(&self, id: ProductId) -> Result<CrawlOutcome, CrawlFailure> {
        let fail = move |stage: Stage| {
            move |error: CrawlError| CrawlFailure {
                product_id: id,
                stage,
                error,
            }
        };

        let page = self.upstream.fetch_page(id).await.map_err(fail(Stage::Page))?;
        let extracted = self.extractor.extract(&page).map_err(fail(Stage::Extract))?;
        let config = &extracted.config;

        let quote = self
            .upstream
            .fetch_price(config)
            .await
            .map_err(fail(Stage::Price))?;
        let promotion = self
            .upstream
            .fetch_promotion(config)
            .await
            .map_err(fail(Stage::Promotion))?;
        let tax = self.upstream.fetch_tax(id).await.map_err(fail(Stage::Tax))?;
        let listed = parse_amount(&quote.value.price).map_err(fail(Stage::Price))?;

        let resolution = self.engine.resolve(listed, config, &promotion.value, tax);
        debug!(product_id = id, listed, tax, price = resolution.price, "price resolved");

        let push = match self
            .cache
            .update(id, &config.name, resolution.price, &resolution.content)
            .await
        {
            Ok(push) => push,
            Err(CrawlError::DataSame) => {
                debug!(product_id = id, "observation unchanged");
                return Ok(CrawlOutcome::Unchanged);
            }
            Err(error) => return Err(fail(Stage::Cache)(error)),
        };

        let row = HistoryRow {
            product_id: id,
            price: resolution.price,
            content: resolution.content,
            price_payload: quote.raw,
            promotion_payload: promotion.raw,
            page_config: extracted.literal,
        };
        if let Err(error) = self.store.insert_history(&row).await {
            // rehydrate next time, so the unrecorded sample is not taken as a duplicate
            self.cache.forget(id).await;
            return Err(fail(Stage::History)(error));
        }

        let mut delivered = 0;
        if push {
            self.metrics.pushed();
            let message = push_message(&config.name, resolution.price, id);
            let subscribers = self
                .store
                .subscribers(id)
                .await
                .map_err(fail(Stage::Notify))?;
            info!(
                product_id = id,
                price = resolution.price,
                subscribers = subscribers.len(),
                "price drop"
            );
            for subscriber in &subscribers {
                match self.notifier.deliver(subscriber, &message).await {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        warn!(product_id = id, subscriber, error = %err, "push failed")
                    }
                }
            }
        }

        Ok(CrawlOutcome::Recorded {
            price: resolution.price,
            push,
            delivered,
        })
    }
}
