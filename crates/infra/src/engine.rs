//! The engine facade: the narrow operation set front ends call.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use wms_catalog::{ProductId, WarehouseId};
use wms_core::Clock;
use wms_events::EventBus;
use wms_ledger::{StockEntry, StockKey};
use wms_orders::{DateRange, NewOrderLine, Order, OrderId, OrderStatistics};
use wms_reservations::Availability;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::projections::{AlertSink, LowStockMonitor};
use crate::publisher::{EventPublisher, JsonEnvelope};
use crate::reports::InventoryReport;
use crate::retry::RetryPolicy;
use crate::services::{
    CatalogService, EngineContext, OrderProcessor, ReservationManager, StockLedger,
};
use crate::store::{InMemoryWarehouseStore, SqliteWarehouseStore, StoreError, WarehouseStore};
use crate::workers::{ExpirySweeper, ProjectionWorker, SweeperHandle, WorkerHandle};

/// Failure to start a background worker.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("could not read stored state: {0}")]
    Store(#[from] StoreError),

    #[error("could not spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Open the store named by the configuration: SQLite when a database URL is
/// set, the in-memory store otherwise.
pub async fn open_store(config: &EngineConfig) -> Result<Arc<dyn WarehouseStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = SqliteWarehouseStore::connect(url, config.db_max_connections).await?;
            info!(url = %url, "using sqlite store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("WMS_DATABASE_URL not set; state lives in memory only");
            Ok(Arc::new(InMemoryWarehouseStore::new()))
        }
    }
}

/// Warehouse inventory ledger and order-fulfilment engine.
#[derive(Debug)]
pub struct WarehouseEngine<S, B> {
    ctx: EngineContext<S, B>,
    catalog: CatalogService<S, B>,
    ledger: StockLedger<S, B>,
    reservations: ReservationManager<S, B>,
    orders: OrderProcessor<S, B>,
}

impl<S, B> Clone for WarehouseEngine<S, B> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            catalog: self.catalog.clone(),
            ledger: self.ledger.clone(),
            reservations: self.reservations.clone(),
            orders: self.orders.clone(),
        }
    }
}

impl<S, B> WarehouseEngine<S, B>
where
    S: WarehouseStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(
        store: S,
        bus: B,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        reservation_ttl: chrono::Duration,
    ) -> Self {
        let ctx = EngineContext::new(
            Arc::new(store),
            Arc::new(EventPublisher::new(bus)),
            clock,
            retry,
            reservation_ttl,
        );
        let ledger = StockLedger::new(ctx.clone());
        let reservations = ReservationManager::new(ctx.clone());
        Self {
            catalog: CatalogService::new(ctx.clone()),
            orders: OrderProcessor::new(ctx.clone(), reservations.clone(), ledger.clone()),
            ledger,
            reservations,
            ctx,
        }
    }

    pub fn from_config(store: S, bus: B, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self::new(
            store,
            bus,
            clock,
            config.retry.clone(),
            config.reservation_ttl_chrono(),
        )
    }

    pub fn catalog(&self) -> &CatalogService<S, B> {
        &self.catalog
    }

    pub fn ledger(&self) -> &StockLedger<S, B> {
        &self.ledger
    }

    pub fn reservations(&self) -> &ReservationManager<S, B> {
        &self.reservations
    }

    pub fn orders(&self) -> &OrderProcessor<S, B> {
        &self.orders
    }

    pub fn store(&self) -> &S {
        self.ctx.store()
    }

    pub fn bus(&self) -> &B {
        self.ctx.publisher().bus()
    }

    pub async fn submit_order(&self, lines: Vec<NewOrderLine>) -> EngineResult<Order> {
        self.orders.submit(lines, None).await
    }

    pub async fn fulfill_order(&self, id: OrderId) -> EngineResult<Order> {
        self.orders.fulfill(id).await
    }

    pub async fn cancel_order(&self, id: OrderId) -> EngineResult<Order> {
        self.orders.cancel(id).await
    }

    pub async fn receive_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
    ) -> EngineResult<StockEntry> {
        self.ledger
            .receive(StockKey::new(product_id, warehouse_id), quantity, None)
            .await
    }

    pub async fn adjust_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: i64,
        reason: impl Into<String>,
    ) -> EngineResult<StockEntry> {
        self.ledger
            .adjust(StockKey::new(product_id, warehouse_id), delta, reason)
            .await
    }

    pub async fn get_on_hand(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> EngineResult<i64> {
        self.ledger
            .on_hand(StockKey::new(product_id, warehouse_id))
            .await
    }

    pub async fn get_available(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> EngineResult<i64> {
        Ok(self
            .reservations
            .available(StockKey::new(product_id, warehouse_id))
            .await?
            .available)
    }

    pub async fn availability(&self, key: StockKey) -> EngineResult<Availability> {
        self.reservations.available(key).await
    }

    /// Readiness: the store accepts a trivial round trip.
    pub async fn ready(&self) -> bool {
        match self.ctx.store.ping().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "readiness probe failed");
                false
            }
        }
    }

    pub async fn inventory_report(&self) -> EngineResult<InventoryReport> {
        let now = self.ctx.now();
        let store = &self.ctx.store;
        let products = store.list_products().await?;
        let warehouses = store.list_warehouses().await?;
        let positions = store.list_stock_positions().await?;

        let mut held = HashMap::new();
        for position in &positions {
            let active = store.active_reservations(position.key).await?;
            let availability = Availability::compute(position.key, position.on_hand, &active, now);
            if availability.held > 0 {
                held.insert(position.key, availability.held);
            }
        }

        Ok(InventoryReport::build(
            now,
            &products,
            &warehouses,
            &positions,
            &held,
        ))
    }

    pub async fn order_statistics(&self, range: DateRange) -> EngineResult<OrderStatistics> {
        self.orders.statistics(range).await
    }
}

impl<S, B> WarehouseEngine<S, B>
where
    S: WarehouseStore + 'static,
    B: EventBus<JsonEnvelope> + 'static,
{
    /// Start the periodic expiry sweeper on the current tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        ExpirySweeper::new(interval).start(self.reservations.clone())
    }

    /// Subscribe a low-stock monitor to the bus, seed it from the store and
    /// drive it from a worker thread.
    ///
    /// The subscription is taken before the store is read, so nothing
    /// written in between is missed.
    pub async fn spawn_low_stock_monitor<A>(
        &self,
        sink: A,
    ) -> Result<(Arc<LowStockMonitor<A>>, WorkerHandle), StartupError>
    where
        A: AlertSink,
    {
        let subscription = self.bus().subscribe();
        let products = self.ctx.store.list_products().await?;
        let positions = self.ctx.store.list_stock_positions().await?;

        let monitor = Arc::new(LowStockMonitor::new(sink));
        monitor.seed(&products, &positions, self.ctx.now());
        let projection = Arc::clone(&monitor);
        let handle = ProjectionWorker::spawn(
            "low-stock-monitor",
            subscription,
            move |envelope: JsonEnvelope| projection.apply_envelope(&envelope),
        )?;
        info!(products = products.len(), keys = positions.len(), "low-stock monitor started");
        Ok((monitor, handle))
    }
}
