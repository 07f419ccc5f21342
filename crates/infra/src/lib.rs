//! Infrastructure layer: persistence, services, workers and configuration.

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod projections;
pub mod publisher;
pub mod reports;
pub mod retry;
pub mod services;
pub mod store;
pub mod workers;

pub use config::{ConfigError, EngineConfig};
pub use engine::{StartupError, WarehouseEngine, open_store};
pub use error::{EngineError, EngineResult};
pub use publisher::{EventPublisher, JsonEnvelope};
pub use reports::InventoryReport;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use services::{
    CatalogService, EngineContext, LedgerAudit, NewProduct, NewWarehouse, OrderProcessor,
    ProductFilter, ReservationManager, StockLedger, SweepReport,
};
pub use store::{InMemoryWarehouseStore, SqliteWarehouseStore, StoreError, WarehouseStore};
