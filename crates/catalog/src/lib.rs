//! Catalog domain module (event-sourced).
//!
//! Owns Product and Warehouse definitions. Both are soft-disabled rather than
//! deleted so the stock ledger never references a vanished identity.

pub mod code;
pub mod product;
pub mod warehouse;

pub use product::{
    DisableProduct, EnableProduct, Pricing, PricingChanged, Product, ProductCategory,
    ProductCommand, ProductDisabled, ProductEnabled, ProductEvent, ProductId, ProductRegistered,
    ProductRenamed, ProductStatus, RegisterProduct, RenameProduct, ReorderThresholdChanged,
    SetPricing, SetReorderThreshold, StockStatus, UnitOfMeasure, generate_sku,
};
pub use warehouse::{
    DisableWarehouse, EnableWarehouse, Location, RegisterWarehouse, Warehouse, WarehouseCommand,
    WarehouseDisabled, WarehouseEnabled, WarehouseEvent, WarehouseId, WarehouseRegistered,
    WarehouseStatus,
};
