use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use model::{Boundaries, CrawlError, HistoryRow, PersistenceGateway, ProductId, TrackedProduct};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

pub const REQUIRED_TABLES: [&str; 5] = [
    "runs",
    "incidents",
    "products",
    "crawl_history",
    "subscriptions",
];

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);
        // every connection to `sqlite::memory:` is its own database
        let max_connections = if path.starts_with("sqlite::memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_run(&self, run_id: &str, git_sha: Option<&str>) -> Result<()> {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT OR REPLACE INTO runs (run_id, started_at_ms, git_sha, host) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(git_sha)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_incident(
        &self,
        run_id: &str,
        severity: &str,
        kind: &str,
        message: &str,
    ) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO incidents (run_id, ts_ms, severity, kind, message) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(severity)
        .bind(kind)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Names from [`REQUIRED_TABLES`] that the database does not have.
    pub async fn validate_required_tables(&self) -> Result<Vec<String>> {
        let present: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&self.pool)
                .await?;
        Ok(REQUIRED_TABLES
            .iter()
            .filter(|table| !present.iter().any(|(name,)| name == *table))
            .map(|table| table.to_string())
            .collect())
    }

    /// Returns false when the subscription already existed.
    pub async fn subscribe(&self, subscriber: &str, id: ProductId) -> Result<bool> {
        let done = sqlx::query(
            "INSERT OR IGNORE INTO subscriptions (subscriber_id, product_id) VALUES (?1, ?2)",
        )
        .bind(subscriber)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    pub async fn history_len(&self, id: ProductId) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM crawl_history WHERE product_id = ?1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn db_err(err: sqlx::Error) -> CrawlError {
    CrawlError::Persistence(err.to_string())
}

impl PersistenceGateway for Store {
    async fn load_boundaries(&self, id: ProductId) -> Result<Option<Boundaries>, CrawlError> {
        let row: Option<(f64, f64, i64)> = sqlx::query_as(
            "SELECT min_price, max_price, inserted_at FROM products WHERE product_id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        let Some((min_price, max_price, inserted_at)) = row else {
            return Ok(None);
        };
        let samples = self.history_len(id).await.map_err(|err| CrawlError::Persistence(err.to_string()))?;
        Ok(Some(Boundaries {
            min_price,
            max_price,
            inserted_at,
            samples,
        }))
    }

    async fn update_min_price(&self, id: ProductId, price: f64) -> Result<(), CrawlError> {
        sqlx::query("UPDATE products SET min_price = ?1 WHERE product_id = ?2")
            .bind(price)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_max_price(&self, id: ProductId, price: f64) -> Result<(), CrawlError> {
        sqlx::query("UPDATE products SET max_price = ?1 WHERE product_id = ?2")
            .bind(price)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_history(&self, row: &HistoryRow) -> Result<(), CrawlError> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO crawl_history (product_id, ts_ms, price, content, price_payload, promotion_payload, page_config) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(row.product_id)
        .bind(ts_ms)
        .bind(row.price)
        .bind(&row.content)
        .bind(&row.price_payload)
        .bind(&row.promotion_payload)
        .bind(&row.page_config)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn subscribers(&self, id: ProductId) -> Result<Vec<String>, CrawlError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT subscriber_id FROM subscriptions WHERE product_id = ?1 ORDER BY subscriber_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|(subscriber,)| subscriber).collect())
    }

    async fn insert_product(&self, id: ProductId, interval_secs: u64) -> Result<bool, CrawlError> {
        let interval = i64::try_from(interval_secs)
            .map_err(|_| CrawlError::Persistence(format!("interval {interval_secs}s out of range")))?;
        let done = sqlx::query(
            "INSERT OR IGNORE INTO products (product_id, interval_secs, inserted_at) VALUES (?1, ?2, ?3)",
        )
        .bind(id)
        .bind(interval)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected() == 1)
    }

    async fn remove_product(&self, id: ProductId) -> Result<(), CrawlError> {
        sqlx::query("DELETE FROM products WHERE product_id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<TrackedProduct>, CrawlError> {
        let rows: Vec<(i64, i64, f64, f64, i64)> = sqlx::query_as(
            "SELECT product_id, interval_secs, min_price, max_price, inserted_at FROM products ORDER BY product_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(
                |(product_id, interval_secs, min_price, max_price, inserted_at)| TrackedProduct {
                    product_id,
                    interval_secs: u64::try_from(interval_secs).unwrap_or_default(),
                    min_price,
                    max_price,
                    inserted_at,
                },
            )
            .collect())
    }
}

pub async fn init_sqlite(path: &str) -> Result<Store> {
    let store = Store::connect(path).await?;
    info!(path = path, "sqlite initialized");
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<()> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}
