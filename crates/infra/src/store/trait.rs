use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wms_catalog::{Product, ProductId, Warehouse, WarehouseId};
use wms_core::{AggregateRoot, ExpectedVersion};
use wms_ledger::{StockEntry, StockKey};
use wms_orders::{Order, OrderId};
use wms_reservations::{Reservation, ReservationId};

/// Persistence gateway failure.
///
/// These are **infrastructure errors**. Domain rule violations never reach the
/// store; they are decided by the aggregates before a write is attempted.
///
/// - **Conflict**: a revision/version check failed or the backend was busy.
///   Always safe to retry from a fresh read.
/// - **Duplicate**: a uniqueness constraint (SKU, warehouse code) was hit.
/// - **InvalidWrite**: the write itself is malformed (wrong key, missing parts).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("invalid write: {0}")]
    InvalidWrite(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Materialised ledger position of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosition {
    pub key: StockKey,
    /// Sum of all entry deltas for the key.
    pub on_hand: i64,
    pub last_sequence: u64,
    /// Bumped by every write scoped to the key (entries and reservations alike).
    pub revision: u64,
}

impl StockPosition {
    pub fn empty(key: StockKey) -> Self {
        Self {
            key,
            on_hand: 0,
            last_sequence: 0,
            revision: 0,
        }
    }
}

/// Reservation state to upsert as part of a [`StockWrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationWrite {
    pub reservation: Reservation,
    /// Version the stored reservation must be at (0 = must not exist yet).
    pub expected: ExpectedVersion,
}

impl ReservationWrite {
    /// Upsert `reservation`, which was loaded at `loaded_version` and then advanced.
    pub fn new(reservation: Reservation, loaded_version: u64) -> Self {
        Self {
            reservation,
            expected: ExpectedVersion::Exact(loaded_version),
        }
    }
}

/// One atomic, key-scoped unit of work.
///
/// Either part may be absent, not both. The whole write is refused with
/// [`StoreError::Conflict`] unless the key is still at `expected_revision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockWrite {
    pub key: StockKey,
    pub expected_revision: u64,
    pub entry: Option<StockEntry>,
    pub reservation: Option<ReservationWrite>,
}

impl StockWrite {
    /// Shared validation so every backend refuses the same malformed writes.
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.entry.is_none() && self.reservation.is_none() {
            return Err(StoreError::InvalidWrite("empty stock write".to_string()));
        }
        if let Some(entry) = &self.entry {
            if entry.key != self.key {
                return Err(StoreError::InvalidWrite(format!(
                    "entry for {} in write for {}",
                    entry.key, self.key
                )));
            }
        }
        if let Some(r) = &self.reservation {
            if r.reservation.key() != self.key {
                return Err(StoreError::InvalidWrite(format!(
                    "reservation {} belongs to {}, not {}",
                    r.reservation.id(),
                    r.reservation.key(),
                    self.key
                )));
            }
        }
        Ok(())
    }
}

/// Durable home of catalog rows, ledger entries, key positions, reservations
/// and orders.
///
/// ## Atomicity
///
/// Catalog and order saves are single-row upserts guarded by the aggregate
/// version. Everything that changes stock (ledger entries and reservation
/// transitions) goes through [`WarehouseStore::apply_stock_write`], which
/// commits the entry, the reservation and the bumped key revision together or
/// not at all.
///
/// ## Implementation requirements
///
/// - append-only entries, unique `(key, sequence)`, sequence = last + 1
/// - unique SKU per product and code per warehouse
/// - every version/revision mismatch is reported as [`StoreError::Conflict`]
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    /// Trivial round trip used for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn load_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn save_warehouse(
        &self,
        warehouse: &Warehouse,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn load_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError>;

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError>;

    /// Current position; an untouched key reports the empty position.
    async fn stock_position(&self, key: StockKey) -> Result<StockPosition, StoreError>;

    async fn list_stock_positions(&self) -> Result<Vec<StockPosition>, StoreError>;

    /// All entries for the key in sequence order.
    async fn load_entries(&self, key: StockKey) -> Result<Vec<StockEntry>, StoreError>;

    async fn apply_stock_write(&self, write: StockWrite) -> Result<StockPosition, StoreError>;

    async fn load_reservation(&self, id: ReservationId)
    -> Result<Option<Reservation>, StoreError>;

    /// Reservations for the key whose stored status is ACTIVE, due ones included.
    async fn active_reservations(&self, key: StockKey) -> Result<Vec<Reservation>, StoreError>;

    /// ACTIVE reservations whose deadline is at or before `now`, earliest first.
    async fn due_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn save_order(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError>;

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// All orders, oldest first.
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
impl<S> WarehouseStore for Arc<S>
where
    S: WarehouseStore + ?Sized,
{
    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }

    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).save_product(product, expected).await
    }

    async fn load_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).load_product(id).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_products().await
    }

    async fn save_warehouse(
        &self,
        warehouse: &Warehouse,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).save_warehouse(warehouse, expected).await
    }

    async fn load_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        (**self).load_warehouse(id).await
    }

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        (**self).list_warehouses().await
    }

    async fn stock_position(&self, key: StockKey) -> Result<StockPosition, StoreError> {
        (**self).stock_position(key).await
    }

    async fn list_stock_positions(&self) -> Result<Vec<StockPosition>, StoreError> {
        (**self).list_stock_positions().await
    }

    async fn load_entries(&self, key: StockKey) -> Result<Vec<StockEntry>, StoreError> {
        (**self).load_entries(key).await
    }

    async fn apply_stock_write(&self, write: StockWrite) -> Result<StockPosition, StoreError> {
        (**self).apply_stock_write(write).await
    }

    async fn load_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        (**self).load_reservation(id).await
    }

    async fn active_reservations(&self, key: StockKey) -> Result<Vec<Reservation>, StoreError> {
        (**self).active_reservations(key).await
    }

    async fn due_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        (**self).due_reservations(now, limit).await
    }

    async fn save_order(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).save_order(order, expected).await
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).load_order(id).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        (**self).list_orders().await
    }
}
