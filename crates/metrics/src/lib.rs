use anyhow::Result;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Crawl counters, registered on a private registry.
#[derive(Clone)]
pub struct CrawlMetrics {
    registry: Registry,
    crawls: IntCounter,
    failures: IntCounterVec,
    duplicates: IntCounter,
    pushes: IntCounter,
    overlap_skips: IntCounter,
}

impl CrawlMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let crawls = IntCounter::new("tracker_crawls_total", "Crawls started")?;
        let failures = IntCounterVec::new(
            Opts::new("tracker_crawl_failures_total", "Crawls aborted, by stage"),
            &["stage"],
        )?;
        let duplicates = IntCounter::new(
            "tracker_duplicate_samples_total",
            "Observations identical to the last stored one",
        )?;
        let pushes = IntCounter::new("tracker_pushes_total", "Push-worthy observations")?;
        let overlap_skips = IntCounter::new(
            "tracker_overlap_skips_total",
            "Timer firings skipped because a crawl was in flight",
        )?;
        registry.register(Box::new(crawls.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(duplicates.clone()))?;
        registry.register(Box::new(pushes.clone()))?;
        registry.register(Box::new(overlap_skips.clone()))?;
        Ok(Self {
            registry,
            crawls,
            failures,
            duplicates,
            pushes,
            overlap_skips,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn crawl_started(&self) {
        self.crawls.inc();
    }

    pub fn crawl_failed(&self, stage: &str) {
        self.failures.with_label_values(&[stage]).inc();
    }

    pub fn duplicate_sample(&self) {
        self.duplicates.inc();
    }

    pub fn pushed(&self) {
        self.pushes.inc();
    }

    pub fn overlap_skipped(&self) {
        self.overlap_skips.inc();
    }

    /// Text exposition of everything registered.
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let make_svc = make_service_fn(move |_| {
            let metrics = self.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, hyper::Error>(exposition(&metrics)) }
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }
}

fn exposition(metrics: &CrawlMetrics) -> Response<Body> {
    match metrics.render() {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            if let Ok(value) = TextEncoder::new().format_type().parse() {
                response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
            }
            response
        }
        Err(err) => {
            warn!(error = %err, "metrics encoding failed");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}
