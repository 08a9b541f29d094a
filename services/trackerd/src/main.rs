mod admin;
mod sqlite_path;

use std::{future, net::SocketAddr, sync::Arc, time::Duration};

use admin::AdminHandler;
use admin_ipc::{run_server, AdminRequest, DEFAULT_SOCKET_PATH};
use clap::Parser;
use discount::DiscountEngine;
use metrics::CrawlMetrics;
use notify::{HttpNotifier, DEFAULT_PUSH_ENDPOINT};
use page_config::PageConfigExtractor;
use spider::{Scheduler, SchedulerOptions, Spider};
use sqlite_path::{ensure_sqlite_parent_dir, validate_sqlite_path};
use storage::init_sqlite;
use tokio::task;
use tracing::{info, warn, Level};
use upstream::{HttpUpstream, UpstreamConfig};
use uuid::Uuid;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "SQLITE_PATH", default_value = "sqlite://tracker.db")]
    sqlite_path: String,

    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    admin_socket: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9109")]
    metrics_addr: SocketAddr,

    #[arg(long, env = "PUSH_ENDPOINT", default_value = DEFAULT_PUSH_ENDPOINT)]
    push_endpoint: String,

    /// Delivery area code for price and promotion lookups.
    #[arg(long, env = "JD_AREA", default_value = "7_412_47301_0")]
    area: String,

    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Shortest refresh interval a registration may ask for.
    #[arg(long, default_value_t = 60)]
    min_interval_secs: u64,

    /// Let timer firings overlap a crawl of the same product still running.
    #[arg(long)]
    allow_overlap: bool,
}

fn log_startup(args: &Args, run_id: &str) {
    info!(path = %args.sqlite_path, "sqlite path configured");
    info!(socket = %args.admin_socket, "admin socket bind planned");
    info!(addr = %args.metrics_addr, "metrics bind planned");
    info!(endpoint = %args.push_endpoint, area = %args.area, "upstream configured");
    info!(
        min_interval_secs = args.min_interval_secs,
        single_flight = !args.allow_overlap,
        "scheduler configured"
    );
    info!(%run_id, "run initialized");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    validate_sqlite_path(&args.sqlite_path)?;
    ensure_sqlite_parent_dir(&args.sqlite_path)?;

    let run_id = Uuid::new_v4().to_string();
    let store = init_sqlite(&args.sqlite_path).await?;
    store.insert_run(&run_id, option_env!("GIT_SHA")).await?;
    log_startup(&args, &run_id);

    let missing_tables = store.validate_required_tables().await?;
    if !missing_tables.is_empty() {
        warn!(tables = ?missing_tables, "sqlite missing required tables");
        if let Err(err) = store
            .log_incident(
                &run_id,
                "warning",
                "db_schema_missing",
                &format!(
                    "sqlite missing required tables: {}",
                    missing_tables.join(", ")
                ),
            )
            .await
        {
            warn!(error = ?err, "failed to log missing schema incident");
        }
    }

    let timeout = Duration::from_secs(args.request_timeout_secs);
    let upstream = HttpUpstream::new(UpstreamConfig {
        area: args.area.clone(),
        request_timeout: timeout,
        ..Default::default()
    })?;
    let notifier = HttpNotifier::new(args.push_endpoint.clone(), timeout)?;
    let metrics = CrawlMetrics::new()?;
    let spider = Spider::new(
        upstream,
        PageConfigExtractor::default(),
        DiscountEngine::default(),
        Arc::new(store.clone()),
        notifier,
        metrics.clone(),
    );
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(spider),
        SchedulerOptions {
            min_interval: Duration::from_secs(args.min_interval_secs),
            allow_overlap: args.allow_overlap,
        },
    ));

    let metrics_addr = args.metrics_addr;
    task::spawn(async move {
        if let Err(err) = metrics.serve(metrics_addr).await {
            tracing::error!(error = ?err, "metrics server error");
        }
    });

    for failure in scheduler.load_registry().await? {
        if let Err(err) = store
            .log_incident(&run_id, "warning", "crawl_failed", &failure.to_string())
            .await
        {
            warn!(error = ?err, "failed to record crawl incident");
        }
    }

    let handler = Arc::new(AdminHandler {
        run_id: run_id.clone(),
        scheduler: scheduler.clone(),
        store: store.clone(),
    });
    let socket_path = args.admin_socket.clone();
    task::spawn(async move {
        let serve = run_server(&socket_path, move |req: AdminRequest| {
            let handler = handler.clone();
            async move { handler.handle(req).await }
        });
        if let Err(err) = serve.await {
            tracing::error!(error = ?err, "admin ipc server failed");
        }
    });

    info!(
        run_id = %run_id,
        sqlite = %args.sqlite_path,
        admin_socket = %args.admin_socket,
        metrics_addr = %args.metrics_addr,
        tracked = scheduler.tracked().await.len(),
        "ready"
    );
    if let Err(err) = store
        .log_incident(&run_id, "info", "ready", "trackerd booted and ready")
        .await
    {
        warn!(error = ?err, "failed to record ready incident");
    }

    future::pending::<()>().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct VecWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for VecWriter {
        type Writer = VecWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn startup_logs_include_configuration() {
        let args = Args::parse_from([
            "trackerd",
            "--sqlite-path",
            "sqlite:///tmp/tracker-test.db",
            "--admin-socket",
            "/tmp/tracker-test.sock",
            "--metrics-addr",
            "127.0.0.1:9000",
            "--area",
            "1_72_2799_0",
            "--allow-overlap",
        ]);
        let run_id = Uuid::nil().to_string();
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = VecWriter(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .with_writer(writer)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_startup(&args, &run_id);
        });

        let output =
            String::from_utf8(buffer.lock().unwrap().clone()).expect("log output should be utf8");
        assert!(output.contains("sqlite path configured"));
        assert!(output.contains("admin socket bind planned"));
        assert!(output.contains("metrics bind planned"));
        assert!(output.contains("run initialized"));
        assert!(output.contains(&args.sqlite_path));
        assert!(output.contains(&args.admin_socket));
        assert!(output.contains(&args.metrics_addr.to_string()));
        assert!(output.contains("1_72_2799_0"));
        assert!(output.contains("single_flight=false"));
        assert!(output.contains(&run_id));
    }

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::parse_from(["trackerd"]);
        assert_eq!(args.push_endpoint, "http://localhost/push");
        assert_eq!(args.request_timeout_secs, 30);
        assert_eq!(args.min_interval_secs, 60);
        assert!(!args.allow_overlap);
    }
}
