//! Persistence gateway.
//!
//! Domain crates decide; this module durably records what they decided. Every
//! stock-affecting change is one [`StockWrite`] guarded by the key's revision,
//! so two writers racing on the same (Product, Warehouse) can never both win.

pub mod in_memory;
pub mod sqlite;
pub mod r#trait;

pub use in_memory::InMemoryWarehouseStore;
pub use r#trait::{ReservationWrite, StockPosition, StockWrite, StoreError, WarehouseStore};
pub use sqlite::SqliteWarehouseStore;
