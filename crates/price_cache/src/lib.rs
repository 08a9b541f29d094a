//! Per-product price tracking: last observation, historical boundaries and
//! the decision whether an observation is worth a notification.
//!
//! One readers-writer lock covers the whole map. Updates hold it for their
//! boundary writes to the store, so the read-then-extend of a product's
//! boundaries is atomic; the cost is that a slow store stalls every reader.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, Utc};
use model::{
    format_elapsed, is_unavailable, Boundaries, CrawlError, PersistenceGateway, PriceRecord,
    ProductId,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct PriceCache<S> {
    store: Arc<S>,
    records: RwLock<HashMap<ProductId, PriceRecord>>,
}

impl<S: PersistenceGateway> PriceCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Records an observation and reports whether subscribers should hear
    /// about it.
    ///
    /// Returns `Err(CrawlError::DataSame)` when both price and content match
    /// the last observation; nothing is changed in that case.
    pub async fn update(
        &self,
        id: ProductId,
        name: &str,
        price: f64,
        content: &str,
    ) -> Result<bool, CrawlError> {
        let mut records = self.records.write().await;
        if !records.contains_key(&id) {
            let record = self.hydrate(id).await?;
            records.insert(id, record);
        }
        let Some(record) = records.get_mut(&id) else {
            return Err(CrawlError::Persistence(format!("product {id} vanished from cache")));
        };

        if record.price == Some(price) && record.content == content {
            return Err(CrawlError::DataSame);
        }

        let mut push = false;
        let mut new_min = None;
        if !is_unavailable(price) {
            if record.min_price == 0.0 {
                new_min = Some(price);
            } else if price < record.min_price {
                new_min = Some(price);
                push = true;
            } else if price == record.min_price && record.price != Some(price) {
                push = true;
            }
        }
        let new_max = (price > record.max_price || record.max_price == 0.0).then_some(price);

        // store first: a failed write leaves the record as it was
        if let Some(min) = new_min {
            self.store.update_min_price(id, min).await?;
        }
        if let Some(max) = new_max {
            self.store.update_max_price(id, max).await?;
        }
        if let Some(min) = new_min {
            if push {
                info!(product_id = id, price, previous = record.min_price, "new minimum price");
            } else {
                debug!(product_id = id, price, "minimum seeded");
            }
            record.min_price = min;
        }
        if let Some(max) = new_max {
            record.max_price = max;
        }

        record.name = name.to_string();
        record.price = Some(price);
        record.content = content.to_string();
        record.updated_at = Local::now().format("%m-%d %H:%M:%S").to_string();
        record.samples += 1;
        Ok(push)
    }

    async fn hydrate(&self, id: ProductId) -> Result<PriceRecord, CrawlError> {
        let Boundaries {
            min_price,
            max_price,
            inserted_at,
            samples,
        } = self
            .store
            .load_boundaries(id)
            .await?
            .ok_or_else(|| CrawlError::Persistence(format!("product {id} is not registered")))?;
        debug!(product_id = id, min_price, max_price, samples, "cache entry hydrated");
        Ok(PriceRecord {
            min_price,
            max_price,
            inserted_at,
            samples,
            ..PriceRecord::new(id)
        })
    }

    /// Records for the requested ids that are in the cache, in request
    /// order, with `elapsed` computed now.
    pub async fn select(&self, ids: &[ProductId]) -> Vec<PriceRecord> {
        let records = self.records.read().await;
        let now = Utc::now().timestamp();
        ids.iter()
            .filter_map(|id| records.get(id))
            .map(|record| PriceRecord {
                elapsed: format_elapsed(now - record.inserted_at),
                ..record.clone()
            })
            .collect()
    }

    pub async fn get(&self, id: ProductId) -> Option<PriceRecord> {
        self.records.read().await.get(&id).cloned()
    }

    /// Known to the cache or registered in the store.
    pub async fn exists(&self, id: ProductId) -> Result<bool, CrawlError> {
        if self.records.read().await.contains_key(&id) {
            return Ok(true);
        }
        Ok(self.store.load_boundaries(id).await?.is_some())
    }

    /// Drops a product's entry, e.g. after its registration was rolled back.
    pub async fn forget(&self, id: ProductId) {
        self.records.write().await.remove(&id);
    }
}
