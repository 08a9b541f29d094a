use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use discount::DiscountEngine;
use metrics::CrawlMetrics;
use model::{
    Boundaries, Coupon, CrawlError, HistoryRow, NotificationGateway, PageConfig,
    PersistenceGateway, PriceQuote, ProductId, PromotionInfo, TrackedProduct,
};
use page_config::PageConfigExtractor;
use spider::{CrawlOutcome, RegisterError, Scheduler, SchedulerOptions, Spider, Stage};
use upstream::{Fetched, Upstream};

#[derive(Default)]
struct UpstreamState {
    price: Mutex<String>,
    promotion: Mutex<PromotionInfo>,
    tax: Mutex<f64>,
    broken_pages: Mutex<HashSet<ProductId>>,
    tax_down: Mutex<bool>,
    delay: Mutex<Duration>,
    page_fetches: AtomicUsize,
}

#[derive(Clone, Default)]
struct FakeUpstream(Arc<UpstreamState>);

impl FakeUpstream {
    fn set_price(&self, price: &str) {
        *self.0.price.lock().unwrap() = price.to_string();
    }
}

impl Upstream for FakeUpstream {
    async fn fetch_page(&self, id: ProductId) -> Result<Vec<u8>, CrawlError> {
        self.0.page_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.0.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.0.broken_pages.lock().unwrap().contains(&id) {
            return Ok(b"<html>maintenance</html>".to_vec());
        }
        Ok(format!(
            "<script>var pageConfig = {{ product: {{ skuid: {id}, name: 'Item {id}', \
             src: 'jfs/{id}.jpg', cat: [1, 2, 3] }} }};</script>"
        )
        .into_bytes())
    }

    async fn fetch_price(&self, _config: &PageConfig) -> Result<Fetched<PriceQuote>, CrawlError> {
        let price = self.0.price.lock().unwrap().clone();
        Ok(Fetched {
            raw: format!(r#"[{{"p":"{price}"}}]"#),
            value: PriceQuote {
                price,
                origin_price: String::new(),
            },
        })
    }

    async fn fetch_promotion(
        &self,
        _config: &PageConfig,
    ) -> Result<Fetched<PromotionInfo>, CrawlError> {
        Ok(Fetched {
            value: self.0.promotion.lock().unwrap().clone(),
            raw: "{}".into(),
        })
    }

    async fn fetch_tax(&self, _id: ProductId) -> Result<f64, CrawlError> {
        if *self.0.tax_down.lock().unwrap() {
            return Err(CrawlError::fetch("https://c.3.cn/globalBuy", "HTTP 503"));
        }
        Ok(*self.0.tax.lock().unwrap())
    }
}

#[derive(Default)]
struct MemoryStore {
    products: Mutex<HashMap<ProductId, TrackedProduct>>,
    history: Mutex<Vec<HistoryRow>>,
    subscriptions: Mutex<HashMap<ProductId, Vec<String>>>,
    history_down: Mutex<bool>,
}

impl MemoryStore {
    fn history_for(&self, id: ProductId) -> Vec<HistoryRow> {
        let history = self.history.lock().unwrap();
        history.iter().filter(|row| row.product_id == id).cloned().collect()
    }

    fn product(&self, id: ProductId) -> Option<TrackedProduct> {
        self.products.lock().unwrap().get(&id).cloned()
    }

    fn seed(&self, id: ProductId, interval_secs: u64) {
        self.products.lock().unwrap().insert(
            id,
            TrackedProduct {
                product_id: id,
                interval_secs,
                min_price: 0.0,
                max_price: 0.0,
                inserted_at: 1_500_000_000,
            },
        );
    }

    fn subscribe(&self, id: ProductId, subscribers: &[&str]) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(id, subscribers.iter().map(|s| s.to_string()).collect());
    }
}

impl PersistenceGateway for MemoryStore {
    async fn load_boundaries(&self, id: ProductId) -> Result<Option<Boundaries>, CrawlError> {
        let samples = self.history_for(id).len() as i64;
        Ok(self.product(id).map(|p| Boundaries {
            min_price: p.min_price,
            max_price: p.max_price,
            inserted_at: p.inserted_at,
            samples,
        }))
    }

    async fn update_min_price(&self, id: ProductId, price: f64) -> Result<(), CrawlError> {
        if let Some(p) = self.products.lock().unwrap().get_mut(&id) {
            p.min_price = price;
        }
        Ok(())
    }

    async fn update_max_price(&self, id: ProductId, price: f64) -> Result<(), CrawlError> {
        if let Some(p) = self.products.lock().unwrap().get_mut(&id) {
            p.max_price = price;
        }
        Ok(())
    }

    async fn insert_history(&self, row: &HistoryRow) -> Result<(), CrawlError> {
        if *self.history_down.lock().unwrap() {
            return Err(CrawlError::Persistence("database is locked".into()));
        }
        self.history.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn subscribers(&self, id: ProductId) -> Result<Vec<String>, CrawlError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_product(&self, id: ProductId, interval_secs: u64) -> Result<bool, CrawlError> {
        if self.product(id).is_some() {
            return Ok(false);
        }
        self.seed(id, interval_secs);
        Ok(true)
    }

    async fn remove_product(&self, id: ProductId) -> Result<(), CrawlError> {
        self.products.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<TrackedProduct>, CrawlError> {
        let mut products: Vec<_> = self.products.lock().unwrap().values().cloned().collect();
        products.sort_by_key(|p| p.product_id);
        Ok(products)
    }
}

#[derive(Clone, Default)]
struct FakeNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl NotificationGateway for FakeNotifier {
    async fn deliver(&self, subscriber: &str, message: &str) -> Result<(), CrawlError> {
        if subscriber == "unreachable" {
            return Err(CrawlError::Delivery(format!("{subscriber}: HTTP 502")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscriber.to_string(), message.to_string()));
        Ok(())
    }
}

type TestSpider = Spider<FakeUpstream, PageConfigExtractor, MemoryStore, FakeNotifier>;

struct Harness {
    upstream: FakeUpstream,
    store: Arc<MemoryStore>,
    notifier: FakeNotifier,
    spider: Arc<TestSpider>,
}

fn harness() -> Harness {
    let upstream = FakeUpstream::default();
    upstream.set_price("1000.00");
    let store = Arc::new(MemoryStore::default());
    let notifier = FakeNotifier::default();
    let spider = Arc::new(Spider::new(
        upstream.clone(),
        PageConfigExtractor::default(),
        DiscountEngine::default(),
        store.clone(),
        notifier.clone(),
        CrawlMetrics::new().unwrap(),
    ));
    Harness {
        upstream,
        store,
        notifier,
        spider,
    }
}

fn scheduler(h: &Harness, options: SchedulerOptions) -> Scheduler<FakeUpstream, PageConfigExtractor, MemoryStore, FakeNotifier> {
    Scheduler::new(h.spider.clone(), options)
}

fn threshold(quota: i64, discount: i64) -> Coupon {
    Coupon {
        coupon_style: 0,
        quota,
        discount,
        name: "全品类".into(),
        ..Default::default()
    }
}

fn metric_text(spider: &TestSpider) -> String {
    String::from_utf8(spider.metrics().render().unwrap()).unwrap()
}

#[tokio::test]
async fn coupon_and_tax_resolve_to_effective_price() {
    let h = harness();
    h.store.seed(1268059, 600);
    h.upstream.0.promotion.lock().unwrap().coupons = vec![threshold(200, 10)];
    *h.upstream.0.tax.lock().unwrap() = 50.0;

    let outcome = h.spider.crawl(1268059).await.unwrap();
    assert_eq!(
        outcome,
        CrawlOutcome::Recorded {
            price: 1000.00,
            push: false,
            delivered: 0
        }
    );

    let history = h.store.history_for(1268059);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].price, 1000.00);
    assert_eq!(history[0].price_payload, r#"[{"p":"1000.00"}]"#);
    assert!(history[0].page_config.starts_with("var pageConfig"));
    assert!(history[0].content.contains("Item 1268059"));

    let record = h.spider.cache().get(1268059).await.unwrap();
    assert_eq!(record.name, "Item 1268059");
    assert_eq!((record.min_price, record.max_price), (1000.0, 1000.0));
    assert_eq!(h.store.product(1268059).unwrap().min_price, 1000.0);
}

#[tokio::test]
async fn unchanged_observation_writes_nothing() {
    let h = harness();
    h.store.seed(7, 600);

    h.spider.crawl(7).await.unwrap();
    let again = h.spider.crawl(7).await.unwrap();

    assert_eq!(again, CrawlOutcome::Unchanged);
    assert_eq!(h.store.history_for(7).len(), 1);
    assert_eq!(h.spider.cache().get(7).await.unwrap().samples, 1);
    assert!(metric_text(&h.spider).contains("tracker_duplicate_samples_total 1"));
}

#[tokio::test]
async fn price_drop_reaches_every_reachable_subscriber() {
    let h = harness();
    h.store.seed(7, 600);
    h.store.subscribe(7, &["alice", "unreachable", "bob"]);

    h.upstream.set_price("200.00");
    h.spider.crawl(7).await.unwrap();
    h.upstream.set_price("100.00");
    let outcome = h.spider.crawl(7).await.unwrap();

    assert_eq!(
        outcome,
        CrawlOutcome::Recorded {
            price: 95.00,
            push: true,
            delivered: 2
        }
    );
    let sent = h.notifier.sent.lock().unwrap().clone();
    let recipients: Vec<_> = sent.iter().map(|(who, _)| who.as_str()).collect();
    assert_eq!(recipients, ["alice", "bob"]);
    assert_eq!(sent[0].1, "Item 7降价至95.00 https://item.jd.com/7.html");
    assert!(metric_text(&h.spider).contains("tracker_pushes_total 1"));
}

#[tokio::test]
async fn returning_to_the_floor_pushes_again() {
    let h = harness();
    h.store.seed(7, 600);
    h.store.subscribe(7, &["alice"]);

    for price in ["200.00", "100.00", "150.00", "100.00"] {
        h.upstream.set_price(price);
        h.spider.crawl(7).await.unwrap();
    }

    assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
    let record = h.spider.cache().get(7).await.unwrap();
    assert!(record.is_min_price());
    assert_eq!(record.samples, 4);
}

#[tokio::test]
async fn delisted_price_is_recorded_but_never_the_floor() {
    let h = harness();
    h.store.seed(7, 600);
    h.store.subscribe(7, &["alice"]);
    h.spider.crawl(7).await.unwrap();

    h.upstream.set_price("-1.00");
    let outcome = h.spider.crawl(7).await.unwrap();

    assert_eq!(
        outcome,
        CrawlOutcome::Recorded {
            price: model::DELISTED_PRICE,
            push: false,
            delivered: 0
        }
    );
    assert_eq!(h.store.product(7).unwrap().min_price, 950.0);
    assert!(h.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_history_write_is_retried_with_its_push() {
    let h = harness();
    h.store.seed(7, 600);
    h.store.subscribe(7, &["alice"]);
    h.upstream.set_price("200.00");
    h.spider.crawl(7).await.unwrap();

    h.upstream.set_price("100.00");
    *h.store.history_down.lock().unwrap() = true;
    let failure = h.spider.crawl(7).await.unwrap_err();
    assert_eq!(failure.stage, Stage::History);
    assert!(h.spider.cache().get(7).await.is_none());

    *h.store.history_down.lock().unwrap() = false;
    let outcome = h.spider.crawl(7).await.unwrap();

    assert_eq!(
        outcome,
        CrawlOutcome::Recorded {
            price: 95.00,
            push: true,
            delivered: 1
        }
    );
    let prices: Vec<_> = h.store.history_for(7).iter().map(|row| row.price).collect();
    assert_eq!(prices, [190.0, 95.0]);
    assert_eq!(
        h.notifier.sent.lock().unwrap()[0].1,
        "Item 7降价至95.00 https://item.jd.com/7.html"
    );
    let record = h.spider.cache().get(7).await.unwrap();
    assert_eq!((record.min_price, record.max_price), (95.0, 190.0));
    assert_eq!(record.samples, 2);
}

#[tokio::test]
async fn failing_stage_aborts_without_side_effects() {
    let h = harness();
    h.store.seed(7, 600);
    *h.upstream.0.tax_down.lock().unwrap() = true;

    let failure = h.spider.crawl(7).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Tax);
    assert!(matches!(failure.error, CrawlError::Fetch { .. }));
    assert!(h.store.history_for(7).is_empty());
    assert!(h.spider.cache().get(7).await.is_none());

    h.upstream.0.broken_pages.lock().unwrap().insert(7);
    let failure = h.spider.crawl(7).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Extract);
    assert!(matches!(failure.error, CrawlError::Extraction(_)));

    h.upstream.set_price("");
    h.upstream.0.broken_pages.lock().unwrap().clear();
    *h.upstream.0.tax_down.lock().unwrap() = false;
    let failure = h.spider.crawl(7).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Price);

    let text = metric_text(&h.spider);
    assert!(text.contains(r#"tracker_crawl_failures_total{stage="tax"} 1"#));
    assert!(text.contains("tracker_crawls_total 3"));
}

#[tokio::test]
async fn registration_guards() {
    let h = harness();
    let scheduler = scheduler(
        &h,
        SchedulerOptions {
            min_interval: Duration::from_secs(60),
            allow_overlap: false,
        },
    );

    let err = scheduler.register(7, 10).await.unwrap_err();
    assert!(matches!(
        err,
        RegisterError::IntervalTooSmall {
            requested: 10,
            minimum: 60
        }
    ));

    scheduler.register(7, 600).await.unwrap();
    assert_eq!(scheduler.tracked().await, [7]);
    assert_eq!(h.store.history_for(7).len(), 1);

    let err = scheduler.register(7, 600).await.unwrap_err();
    assert!(matches!(err, RegisterError::AlreadyRegistered(7)));

    h.store.seed(8, 600);
    let err = scheduler.register(8, 600).await.unwrap_err();
    assert!(matches!(err, RegisterError::AlreadyRegistered(8)));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn failed_first_crawl_rolls_registration_back() {
    let h = harness();
    let scheduler = scheduler(&h, SchedulerOptions::default());
    h.upstream.0.broken_pages.lock().unwrap().insert(9);

    let err = scheduler.register(9, 600).await.unwrap_err();
    match err {
        RegisterError::FirstCrawl(failure) => assert_eq!(failure.stage, Stage::Extract),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(h.store.product(9).is_none());
    assert!(scheduler.tracked().await.is_empty());
    assert!(!h.spider.cache().exists(9).await.unwrap());

    h.upstream.0.broken_pages.lock().unwrap().clear();
    scheduler.register(9, 600).await.unwrap();
    scheduler.shutdown().await;
}

#[tokio::test]
async fn registry_load_keeps_failing_products_on_timer() {
    let h = harness();
    h.store.seed(1, 600);
    h.store.seed(2, 600);
    h.upstream.0.broken_pages.lock().unwrap().insert(2);
    let scheduler = scheduler(&h, SchedulerOptions::default());

    let failures = scheduler.load_registry().await.unwrap();

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].product_id, 2);
    assert_eq!(scheduler.tracked().await, [1, 2]);
    assert_eq!(h.store.history_for(1).len(), 1);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn single_flight_skips_overlapping_crawls() {
    let h = harness();
    h.store.seed(7, 600);
    *h.upstream.0.delay.lock().unwrap() = Duration::from_millis(200);
    let scheduler = Arc::new(scheduler(&h, SchedulerOptions::default()));

    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.crawl_now(7).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scheduler.in_flight(), 1);
    let second = scheduler.crawl_now(7).await.unwrap();

    assert_eq!(second, CrawlOutcome::Skipped);
    assert!(matches!(
        first.await.unwrap().unwrap(),
        CrawlOutcome::Recorded { .. }
    ));
    assert_eq!(h.upstream.0.page_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.in_flight(), 0);
    assert!(metric_text(&h.spider).contains("tracker_overlap_skips_total 1"));
}

#[tokio::test]
async fn overlap_allowed_runs_both_crawls() {
    let h = harness();
    h.store.seed(7, 600);
    *h.upstream.0.delay.lock().unwrap() = Duration::from_millis(100);
    let scheduler = Arc::new(scheduler(
        &h,
        SchedulerOptions {
            allow_overlap: true,
            ..Default::default()
        },
    ));
    assert!(!scheduler.single_flight());

    let (a, b) = tokio::join!(scheduler.crawl_now(7), scheduler.crawl_now(7));
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(h.upstream.0.page_fetches.load(Ordering::SeqCst), 2);
    assert!(outcomes.contains(&CrawlOutcome::Unchanged));
    assert_eq!(h.store.history_for(7).len(), 1);
}

#[tokio::test]
async fn timer_fires_after_each_interval() {
    let h = harness();
    let scheduler = scheduler(
        &h,
        SchedulerOptions {
            min_interval: Duration::ZERO,
            allow_overlap: false,
        },
    );

    scheduler.register(7, 1).await.unwrap();
    assert_eq!(h.upstream.0.page_fetches.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.upstream.0.page_fetches.load(Ordering::SeqCst), 2);

    scheduler.shutdown().await;
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(h.upstream.0.page_fetches.load(Ordering::SeqCst), 2);
}
