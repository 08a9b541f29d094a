use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use model::{CrawlError, NotificationGateway, PersistenceGateway, ProductId};
use page_config::ConfigExtractor;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use upstream::Upstream;

use crate::{CrawlFailure, CrawlOutcome, InFlight, Spider};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub min_interval: Duration,
    /// Let a firing start while the previous crawl of the same product runs.
    pub allow_overlap: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            allow_overlap: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("product {0} is already registered")]
    AlreadyRegistered(ProductId),
    #[error("interval {requested}s is below the {minimum}s minimum")]
    IntervalTooSmall { requested: u64, minimum: u64 },
    #[error("registry: {0}")]
    Store(#[from] CrawlError),
    #[error("first crawl: {0}")]
    FirstCrawl(#[from] CrawlFailure),
}

/// One recurring timer per product, each firing running a crawl.
pub struct Scheduler<U, E, S, N> {
    spider: Arc<Spider<U, E, S, N>>,
    options: SchedulerOptions,
    in_flight: InFlight,
    timers: Mutex<HashMap<ProductId, JoinHandle<()>>>,
}

impl<U, E, S, N> Scheduler<U, E, S, N>
where
    U: Upstream + 'static,
    E: ConfigExtractor + 'static,
    S: PersistenceGateway + 'static,
    N: NotificationGateway + 'static,
{
    pub fn new(spider: Arc<Spider<U, E, S, N>>, options: SchedulerOptions) -> Self {
        Self {
            spider,
            options,
            in_flight: InFlight::default(),
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn spider(&self) -> &Spider<U, E, S, N> {
        &self.spider
    }

    pub fn single_flight(&self) -> bool {
        !self.options.allow_overlap
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn tracked(&self) -> Vec<ProductId> {
        let mut ids: Vec<_> = self.timers.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Adds a product: stored, crawled once, then put on its timer.
    ///
    /// If the first crawl fails the product is removed again.
    pub async fn register(&self, id: ProductId, interval_secs: u64) -> Result<(), RegisterError> {
        let minimum = self.options.min_interval.as_secs();
        if interval_secs < minimum {
            return Err(RegisterError::IntervalTooSmall {
                requested: interval_secs,
                minimum,
            });
        }
        let timed = self.timers.lock().await.contains_key(&id);
        if timed || self.spider.cache().exists(id).await? {
            return Err(RegisterError::AlreadyRegistered(id));
        }
        if !self.spider.store().insert_product(id, interval_secs).await? {
            return Err(RegisterError::AlreadyRegistered(id));
        }

        if let Err(failure) = self.crawl_now(id).await {
            self.spider.cache().forget(id).await;
            if let Err(err) = self.spider.store().remove_product(id).await {
                warn!(product_id = id, error = %err, "rollback of failed registration");
            }
            return Err(failure.into());
        }

        self.start_timer(id, Duration::from_secs(interval_secs)).await;
        info!(product_id = id, interval_secs, "product registered");
        Ok(())
    }

    /// Boots every stored product. Products whose first crawl fails keep
    /// their timer; the failures are handed back for bookkeeping.
    pub async fn load_registry(&self) -> Result<Vec<CrawlFailure>, CrawlError> {
        let products = self.spider.store().list_products().await?;
        let mut failures = Vec::new();
        for product in products {
            if self.timers.lock().await.contains_key(&product.product_id) {
                continue;
            }
            if let Err(failure) = self.crawl_now(product.product_id).await {
                failures.push(failure);
            }
            self.start_timer(
                product.product_id,
                Duration::from_secs(product.interval_secs.max(1)),
            )
            .await;
        }
        info!(
            tracked = self.timers.lock().await.len(),
            failed = failures.len(),
            "registry loaded"
        );
        Ok(failures)
    }

    /// Crawls now, outside the product's timer. With single-flight on, a
    /// product that is already being crawled is skipped.
    pub async fn crawl_now(&self, id: ProductId) -> Result<CrawlOutcome, CrawlFailure> {
        let _guard = if self.options.allow_overlap {
            None
        } else {
            match self.in_flight.try_acquire(id) {
                Some(guard) => Some(guard),
                None => {
                    self.spider.metrics().overlap_skipped();
                    debug!(product_id = id, "crawl already in flight");
                    return Ok(CrawlOutcome::Skipped);
                }
            }
        };
        self.spider.crawl(id).await
    }

    async fn start_timer(&self, id: ProductId, period: Duration) {
        let spider = self.spider.clone();
        let in_flight = self.in_flight.clone();
        let allow_overlap = self.options.allow_overlap;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let guard = if allow_overlap {
                    None
                } else {
                    match in_flight.try_acquire(id) {
                        Some(guard) => Some(guard),
                        None => {
                            spider.metrics().overlap_skipped();
                            debug!(product_id = id, "previous crawl still running, firing skipped");
                            continue;
                        }
                    }
                };
                let spider = spider.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    // failures are logged and counted by the spider
                    let _ = spider.crawl(id).await;
                });
            }
        });
        if let Some(previous) = self.timers.lock().await.insert(id, handle) {
            previous.abort();
        }
    }

    /// Stops every timer. Crawls already running finish on their own.
    pub async fn shutdown(&self) {
        for (_, handle) in self.timers.lock().await.drain() {
            handle.abort();
        }
    }
}
