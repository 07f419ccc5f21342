//! Application services: load state from the store, let the aggregates
//! decide, write the outcome back atomically and publish what happened.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use wms_catalog::{Product, ProductId, Warehouse, WarehouseId};
use wms_core::Clock;
use wms_events::EventBus;
use wms_ledger::StockKey;

use crate::error::{EngineError, EngineResult};
use crate::locks::KeyLocks;
use crate::publisher::{EventPublisher, JsonEnvelope};
use crate::retry::RetryPolicy;
use crate::store::WarehouseStore;

pub mod catalog;
pub mod ledger;
pub mod orders;
pub mod reservations;

pub use catalog::{CatalogService, NewProduct, NewWarehouse, ProductFilter};
pub use ledger::{LedgerAudit, StockLedger};
pub use orders::OrderProcessor;
pub use reservations::{ReservationManager, SweepReport};

/// Everything a service needs, shared by all of them.
#[derive(Debug)]
pub struct EngineContext<S, B> {
    pub(crate) store: Arc<S>,
    pub(crate) publisher: Arc<EventPublisher<B>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) stock_locks: Arc<KeyLocks<StockKey>>,
    pub(crate) retry: RetryPolicy,
    pub(crate) reservation_ttl: Duration,
}

impl<S, B> Clone for EngineContext<S, B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            publisher: Arc::clone(&self.publisher),
            clock: Arc::clone(&self.clock),
            stock_locks: Arc::clone(&self.stock_locks),
            retry: self.retry.clone(),
            reservation_ttl: self.reservation_ttl,
        }
    }
}

impl<S, B> EngineContext<S, B>
where
    S: WarehouseStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(
        store: Arc<S>,
        publisher: Arc<EventPublisher<B>>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        reservation_ttl: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            stock_locks: Arc::new(KeyLocks::new()),
            retry,
            reservation_ttl,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publisher(&self) -> &EventPublisher<B> {
        &self.publisher
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) async fn require_product(&self, id: ProductId) -> EngineResult<Product> {
        self.store
            .load_product(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("product {id}")))
    }

    pub(crate) async fn require_warehouse(&self, id: WarehouseId) -> EngineResult<Warehouse> {
        self.store
            .load_warehouse(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("warehouse {id}")))
    }

    /// Both halves of the key exist (disabled ones included).
    pub(crate) async fn require_key(&self, key: StockKey) -> EngineResult<(Product, Warehouse)> {
        let product = self.require_product(key.product_id).await?;
        let warehouse = self.require_warehouse(key.warehouse_id).await?;
        Ok((product, warehouse))
    }

    /// Both halves of the key exist and accept new reservations.
    pub(crate) async fn require_active_key(&self, key: StockKey) -> EngineResult<Product> {
        let (product, warehouse) = self.require_key(key).await?;
        if !product.is_active() {
            return Err(EngineError::validation(format!(
                "product {} is disabled",
                product.sku()
            )));
        }
        if !warehouse.is_active() {
            return Err(EngineError::validation(format!(
                "warehouse {} is disabled",
                warehouse.code()
            )));
        }
        Ok(product)
    }
}
