use model::{HistoryRow, PersistenceGateway};
use storage::{init_sqlite, Store};
use tempfile::TempDir;

async fn open() -> (TempDir, Store) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("tracker.db").display());
    let store = init_sqlite(&url).await.expect("store opens");
    (dir, store)
}

fn history(id: i64, price: f64) -> HistoryRow {
    HistoryRow {
        product_id: id,
        price,
        content: "<tr></tr>".into(),
        price_payload: r#"[{"p":"1.00"}]"#.into(),
        promotion_payload: "{}".into(),
        page_config: "var pageConfig = {};".into(),
    }
}

#[tokio::test]
async fn schema_is_complete() {
    let (_dir, store) = open().await;
    assert!(store.validate_required_tables().await.unwrap().is_empty());
}

#[tokio::test]
async fn product_registry_round_trip() {
    let (_dir, store) = open().await;
    assert!(store.insert_product(1268059, 600).await.unwrap());
    assert!(!store.insert_product(1268059, 60).await.unwrap());
    assert!(store.insert_product(42, 3600).await.unwrap());

    let products = store.list_products().await.unwrap();
    let ids: Vec<_> = products.iter().map(|p| (p.product_id, p.interval_secs)).collect();
    assert_eq!(ids, [(42, 3600), (1268059, 600)]);

    store.remove_product(42).await.unwrap();
    assert!(store.load_boundaries(42).await.unwrap().is_none());
}

#[tokio::test]
async fn boundaries_reflect_updates_and_history() {
    let (_dir, store) = open().await;
    store.insert_product(7, 600).await.unwrap();

    let fresh = store.load_boundaries(7).await.unwrap().unwrap();
    assert_eq!((fresh.min_price, fresh.max_price, fresh.samples), (0.0, 0.0, 0));
    assert!(fresh.inserted_at > 0);

    store.update_min_price(7, 88.5).await.unwrap();
    store.update_max_price(7, 120.0).await.unwrap();
    store.insert_history(&history(7, 88.5)).await.unwrap();
    store.insert_history(&history(7, 120.0)).await.unwrap();
    store.insert_history(&history(8, 1.0)).await.unwrap();

    let loaded = store.load_boundaries(7).await.unwrap().unwrap();
    assert_eq!(loaded.min_price, 88.5);
    assert_eq!(loaded.max_price, 120.0);
    assert_eq!(loaded.samples, 2);
    assert_eq!(loaded.inserted_at, fresh.inserted_at);
}

#[tokio::test]
async fn subscribers_are_per_product() {
    let (_dir, store) = open().await;
    assert!(store.subscribe("u2", 7).await.unwrap());
    assert!(store.subscribe("u1", 7).await.unwrap());
    assert!(!store.subscribe("u1", 7).await.unwrap());
    store.subscribe("u3", 8).await.unwrap();

    assert_eq!(store.subscribers(7).await.unwrap(), ["u1", "u2"]);
    assert!(store.subscribers(9).await.unwrap().is_empty());
}

#[tokio::test]
async fn runs_and_incidents_are_recorded() {
    let (_dir, store) = open().await;
    store.insert_run("run-1", None).await.unwrap();
    store
        .log_incident("run-1", "warning", "crawl_failed", "product 7: fetch failed")
        .await
        .unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM incidents")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn memory_database_keeps_state() {
    let store = Store::connect("sqlite::memory:").await.unwrap();
    store.insert_product(1, 60).await.unwrap();
    assert!(store.load_boundaries(1).await.unwrap().is_some());
}
