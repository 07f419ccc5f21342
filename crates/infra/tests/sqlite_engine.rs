//! The engine running on SQLite: the same guarantees as in memory, plus
//! state that survives a reconnect.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use wms_catalog::{Location, Pricing, ProductCategory, UnitOfMeasure};
use wms_core::SystemClock;
use wms_events::InMemoryEventBus;
use wms_infra::projections::InMemoryAlertSink;
use wms_infra::{
    EngineError, JsonEnvelope, NewProduct, NewWarehouse, RetryPolicy, SqliteWarehouseStore,
    WarehouseEngine,
};
use wms_ledger::StockKey;
use wms_orders::{NewOrderLine, OrderStatus};

type SqliteEngine = WarehouseEngine<SqliteWarehouseStore, Arc<InMemoryEventBus<JsonEnvelope>>>;

fn engine(store: SqliteWarehouseStore) -> SqliteEngine {
    WarehouseEngine::new(
        store,
        Arc::new(InMemoryEventBus::new()),
        Arc::new(SystemClock),
        RetryPolicy::fixed(5, StdDuration::from_millis(5)),
        Duration::minutes(15),
    )
}

async fn stocked(engine: &SqliteEngine, code: &str, on_hand: i64) -> StockKey {
    let product = engine
        .catalog()
        .register_product(NewProduct {
            sku: Some(format!("SKU-{code}")),
            name: "Pallet jack".to_string(),
            category: ProductCategory::General,
            unit: UnitOfMeasure::Each,
            reorder_threshold: 1,
            pricing: Pricing::new(8_000, 12_500),
        })
        .await
        .unwrap();
    let warehouse = engine
        .catalog()
        .register_warehouse(NewWarehouse {
            code: code.to_string(),
            name: "Main".to_string(),
            location: Location {
                address: "7 Quay Street".to_string(),
                zone: Some("A".to_string()),
            },
        })
        .await
        .unwrap();
    let key = StockKey::new(product.id_typed(), warehouse.id_typed());
    engine.ledger().receive(key, on_hand, None).await.unwrap();
    key
}

#[tokio::test]
async fn order_lifecycle_on_sqlite() {
    let store = SqliteWarehouseStore::connect("sqlite::memory:", 1).await.unwrap();
    let engine = engine(store);
    let key = stocked(&engine, "W1", 10).await;

    let order = engine
        .submit_order(vec![NewOrderLine {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity: 7,
        }])
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Reserved);

    assert!(matches!(
        engine.reservations().reserve(key, 5, None, None).await,
        Err(EngineError::InsufficientAvailable { available: 3, requested: 5 })
    ));

    let order = engine.fulfill_order(order.id_typed()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Fulfilled);
    assert_eq!(engine.get_on_hand(key.product_id, key.warehouse_id).await.unwrap(), 3);
    assert_eq!(engine.get_available(key.product_id, key.warehouse_id).await.unwrap(), 3);

    let audit = engine.ledger().verify(key).await.unwrap();
    assert!(audit.consistent);
    assert_eq!(audit.entries, 2);
}

#[tokio::test]
async fn duplicate_codes_are_refused() {
    let store = SqliteWarehouseStore::connect("sqlite::memory:", 1).await.unwrap();
    let engine = engine(store);
    stocked(&engine, "W1", 1).await;

    let err = engine
        .catalog()
        .register_warehouse(NewWarehouse {
            code: "w1".to_string(),
            name: "Copy".to_string(),
            location: Location {
                address: "elsewhere".to_string(),
                zone: None,
            },
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "already_exists");
}

#[tokio::test]
async fn state_survives_a_reconnect() {
    let dir = std::env::temp_dir().join(format!("wms-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    let url = format!("sqlite://{}", dir.join("warehouse.db").display());

    let key = {
        let store = SqliteWarehouseStore::connect(&url, 2).await.unwrap();
        let engine = engine(store);
        let key = stocked(&engine, "W1", 12).await;
        engine.reservations().reserve(key, 5, None, None).await.unwrap();
        engine.store().close().await;
        key
    };

    let store = SqliteWarehouseStore::connect(&url, 2).await.unwrap();
    let engine = engine(store);
    let availability = engine.availability(key).await.unwrap();
    assert_eq!(availability.on_hand, 12);
    assert_eq!(availability.held, 5);
    assert_eq!(availability.available, 7);
    engine.store().close().await;

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn low_stock_monitor_resumes_after_restart() {
    let dir = std::env::temp_dir().join(format!("wms-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    let url = format!("sqlite://{}", dir.join("warehouse.db").display());

    let (low, healthy) = {
        let store = SqliteWarehouseStore::connect(&url, 2).await.unwrap();
        let engine = engine(store);
        let low = stocked(&engine, "W1", 12).await;
        let healthy = stocked(&engine, "W2", 12).await;
        engine.adjust_stock(low.product_id, low.warehouse_id, -11, "count").await.unwrap();
        engine.store().close().await;
        (low, healthy)
    };

    let store = SqliteWarehouseStore::connect(&url, 2).await.unwrap();
    let engine = engine(store);
    let product = engine.catalog().product(healthy.product_id).await.unwrap();
    assert_eq!(product.pricing().selling_price, 12_500);

    let (monitor, worker) = engine
        .spawn_low_stock_monitor(InMemoryAlertSink::new())
        .await
        .unwrap();
    assert_eq!(monitor.low_keys(), vec![low]);
    assert_eq!(monitor.sink().all().len(), 1);

    engine
        .adjust_stock(healthy.product_id, healthy.warehouse_id, -12, "count")
        .await
        .unwrap();
    let mut alerts = Vec::new();
    for _ in 0..100 {
        alerts = monitor.sink().all();
        if alerts.len() > 1 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    worker.shutdown();
    engine.store().close().await;
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[1].key, healthy);
    assert_eq!(alerts[1].on_hand, 0);
}
