use std::sync::Arc;

use admin_ipc::{AdminRequest, AdminResponse, AdminStatus};
use model::NotificationGateway;
use page_config::ConfigExtractor;
use spider::{CrawlOutcome, Scheduler};
use storage::Store;
use tracing::info;
use upstream::Upstream;

/// Answers operator requests against the running scheduler.
pub struct AdminHandler<U, E, N> {
    pub run_id: String,
    pub scheduler: Arc<Scheduler<U, E, Store, N>>,
    pub store: Store,
}

impl<U, E, N> AdminHandler<U, E, N>
where
    U: Upstream + 'static,
    E: ConfigExtractor + 'static,
    N: NotificationGateway + 'static,
{
    pub async fn handle(&self, req: AdminRequest) -> anyhow::Result<AdminResponse> {
        let response = match req {
            AdminRequest::Status => AdminResponse::Status(AdminStatus {
                run_id: self.run_id.clone(),
                tracked: self.scheduler.tracked().await.len(),
                in_flight: self.scheduler.in_flight(),
                single_flight: self.scheduler.single_flight(),
            }),
            AdminRequest::Register {
                product_id,
                interval_secs,
            } => match self.scheduler.register(product_id, interval_secs).await {
                Ok(()) => AdminResponse::Ack,
                Err(err) => AdminResponse::Error(err.to_string()),
            },
            AdminRequest::Query { product_ids } => {
                AdminResponse::Records(self.scheduler.spider().cache().select(&product_ids).await)
            }
            AdminRequest::Crawl { product_id } => match self.scheduler.crawl_now(product_id).await {
                Ok(CrawlOutcome::Skipped) => {
                    AdminResponse::Error(format!("product {product_id} is already being crawled"))
                }
                Ok(_) => AdminResponse::Ack,
                Err(failure) => AdminResponse::Error(failure.to_string()),
            },
            AdminRequest::Subscribe {
                subscriber,
                product_id,
            } => {
                if !self.scheduler.spider().cache().exists(product_id).await? {
                    return Ok(AdminResponse::Error(format!(
                        "product {product_id} is not tracked"
                    )));
                }
                let added = self.store.subscribe(&subscriber, product_id).await?;
                info!(product_id, subscriber = %subscriber, added, "subscription");
                AdminResponse::Ack
            }
        };
        Ok(response)
    }
}
