use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use wms_catalog::{Product, ProductId, Warehouse, WarehouseId};
use wms_core::{AggregateRoot, ExpectedVersion};
use wms_ledger::{StockEntry, StockKey};
use wms_orders::{Order, OrderId};
use wms_reservations::{Reservation, ReservationId, ReservationStatus};

use super::r#trait::{StockPosition, StockWrite, StoreError, WarehouseStore};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    positions: HashMap<StockKey, StockPosition>,
    entries: HashMap<StockKey, Vec<StockEntry>>,
    reservations: HashMap<ReservationId, Reservation>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory persistence gateway.
///
/// Intended for tests/dev. One lock over all tables makes every operation
/// trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryWarehouseStore {
    tables: RwLock<Tables>,
}

impl InMemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn check_version(what: &str, expected: ExpectedVersion, actual: u64) -> Result<(), StoreError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "{what}: expected {expected:?}, found {actual}"
        )))
    }
}

#[async_trait]
impl WarehouseStore for InMemoryWarehouseStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }

    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let id = product.id_typed();

        let current = tables.products.get(&id).map(|p| p.version()).unwrap_or(0);
        check_version(&format!("product {id}"), expected, current)?;

        if let Some(other) = tables
            .products
            .values()
            .find(|p| p.id_typed() != id && p.sku() == product.sku())
        {
            return Err(StoreError::Duplicate(format!(
                "sku {} already used by product {}",
                product.sku(),
                other.id_typed()
            )));
        }

        tables.products.insert(id, product.clone());
        Ok(())
    }

    async fn load_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self.read()?.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(products)
    }

    async fn save_warehouse(
        &self,
        warehouse: &Warehouse,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let id = warehouse.id_typed();

        let current = tables.warehouses.get(&id).map(|w| w.version()).unwrap_or(0);
        check_version(&format!("warehouse {id}"), expected, current)?;

        if tables
            .warehouses
            .values()
            .any(|w| w.id_typed() != id && w.code() == warehouse.code())
        {
            return Err(StoreError::Duplicate(format!(
                "warehouse code {} already exists",
                warehouse.code()
            )));
        }

        tables.warehouses.insert(id, warehouse.clone());
        Ok(())
    }

    async fn load_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        Ok(self.read()?.warehouses.get(&id).cloned())
    }

    async fn list_warehouses(&self) -> Result<Vec<Warehouse>, StoreError> {
        let mut warehouses: Vec<Warehouse> = self.read()?.warehouses.values().cloned().collect();
        warehouses.sort_by(|a, b| a.code().cmp(b.code()));
        Ok(warehouses)
    }

    async fn stock_position(&self, key: StockKey) -> Result<StockPosition, StoreError> {
        Ok(self
            .read()?
            .positions
            .get(&key)
            .copied()
            .unwrap_or_else(|| StockPosition::empty(key)))
    }

    async fn list_stock_positions(&self) -> Result<Vec<StockPosition>, StoreError> {
        let mut positions: Vec<StockPosition> = self.read()?.positions.values().copied().collect();
        positions.sort_by_key(|p| p.key);
        Ok(positions)
    }

    async fn load_entries(&self, key: StockKey) -> Result<Vec<StockEntry>, StoreError> {
        Ok(self.read()?.entries.get(&key).cloned().unwrap_or_default())
    }

    async fn apply_stock_write(&self, write: StockWrite) -> Result<StockPosition, StoreError> {
        write.validate()?;
        let mut tables = self.write()?;

        let mut position = tables
            .positions
            .get(&write.key)
            .copied()
            .unwrap_or_else(|| StockPosition::empty(write.key));
        if position.revision != write.expected_revision {
            return Err(StoreError::Conflict(format!(
                "{}: expected revision {}, found {}",
                write.key, write.expected_revision, position.revision
            )));
        }

        // Check everything before touching any table.
        if let Some(entry) = &write.entry {
            if entry.sequence != position.last_sequence + 1 {
                return Err(StoreError::Conflict(format!(
                    "{}: sequence {} does not follow {}",
                    write.key, entry.sequence, position.last_sequence
                )));
            }
        }
        if let Some(r) = &write.reservation {
            let id = r.reservation.id_typed();
            let current = tables.reservations.get(&id).map(|s| s.version()).unwrap_or(0);
            check_version(&format!("reservation {id}"), r.expected, current)?;
        }

        if let Some(entry) = write.entry {
            position.on_hand += entry.delta;
            position.last_sequence = entry.sequence;
            tables.entries.entry(write.key).or_default().push(entry);
        }
        if let Some(r) = write.reservation {
            tables
                .reservations
                .insert(r.reservation.id_typed(), r.reservation);
        }
        position.revision += 1;
        tables.positions.insert(write.key, position);

        Ok(position)
    }

    async fn load_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        Ok(self.read()?.reservations.get(&id).cloned())
    }

    async fn active_reservations(&self, key: StockKey) -> Result<Vec<Reservation>, StoreError> {
        let mut active: Vec<Reservation> = self
            .read()?
            .reservations
            .values()
            .filter(|r| r.key() == key && r.status() == ReservationStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|r| r.created_at());
        Ok(active)
    }

    async fn due_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut due: Vec<Reservation> = self
            .read()?
            .reservations
            .values()
            .filter(|r| r.is_due_at(now))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.expires_at());
        due.truncate(limit);
        Ok(due)
    }

    async fn save_order(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let id = order.id_typed();

        let current = tables.orders.get(&id).map(|o| o.version()).unwrap_or(0);
        check_version(&format!("order {id}"), expected, current)?;

        tables.orders.insert(id, order.clone());
        Ok(())
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.read()?.orders.values().cloned().collect();
        orders.sort_by_key(|o| (o.placed_at(), o.id_typed()));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ReservationWrite;
    use chrono::Duration;
    use wms_core::{Aggregate, AggregateId};
    use wms_ledger::{EntryId, EntryKind};
    use wms_reservations::{PlaceReservation, ReservationCommand};

    fn key() -> StockKey {
        StockKey::new(
            ProductId::new(AggregateId::new()),
            WarehouseId::new(AggregateId::new()),
        )
    }

    fn receipt(key: StockKey, sequence: u64, delta: i64) -> StockEntry {
        StockEntry {
            entry_id: EntryId::new(AggregateId::new()),
            key,
            delta,
            kind: EntryKind::Receipt,
            sequence,
            recorded_at: Utc::now(),
            reason: None,
            reservation_id: None,
        }
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let store = InMemoryWarehouseStore::new();
        let key = key();

        let write = StockWrite {
            key,
            expected_revision: 0,
            entry: Some(receipt(key, 1, 10)),
            reservation: None,
        };
        let position = store.apply_stock_write(write.clone()).await.unwrap();
        assert_eq!(position.on_hand, 10);
        assert_eq!(position.revision, 1);

        match store.apply_stock_write(write).await {
            Err(StoreError::Conflict(_)) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert_eq!(store.load_entries(key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_partial_state() {
        let store = InMemoryWarehouseStore::new();
        let key = key();
        let id = ReservationId::new(AggregateId::new());
        let mut reservation = Reservation::empty(id, key);
        let now = Utc::now();
        reservation
            .execute(&ReservationCommand::PlaceReservation(PlaceReservation {
                reservation_id: id,
                key,
                quantity: 2,
                order_id: None,
                occurred_at: now,
                expires_at: now + Duration::minutes(5),
            }))
            .unwrap();

        // Reservation claims to replace version 3, which does not exist.
        let write = StockWrite {
            key,
            expected_revision: 0,
            entry: Some(receipt(key, 1, 10)),
            reservation: Some(ReservationWrite::new(reservation, 3)),
        };
        assert!(matches!(
            store.apply_stock_write(write).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.stock_position(key).await.unwrap(), StockPosition::empty(key));
        assert!(store.load_entries(key).await.unwrap().is_empty());
        assert!(store.load_reservation(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_write_is_invalid() {
        let store = InMemoryWarehouseStore::new();
        let write = StockWrite {
            key: key(),
            expected_revision: 0,
            entry: None,
            reservation: None,
        };
        assert!(matches!(
            store.apply_stock_write(write).await,
            Err(StoreError::InvalidWrite(_))
        ));
    }
}
