use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wms_catalog::{
    Location, Pricing, Product, ProductCategory, ProductId, ProductStatus, UnitOfMeasure,
    Warehouse, WarehouseId, WarehouseStatus,
};
use wms_core::{AggregateId, AggregateRoot};
use wms_orders::{
    DateRange, FulfillmentReport, LineFailure, NewOrderLine, Order, OrderLine, OrderStatus,
};
use wms_reservations::{Reservation, ReservationId, ReservationStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RenameProductRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetThresholdRequest {
    pub reorder_threshold: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    /// Defaults to the configured reservation TTL.
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    pub lines: Vec<NewOrderLine>,
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl From<OrderReportQuery> for DateRange {
    fn from(q: OrderReportQuery) -> Self {
        DateRange {
            from: q.from,
            to: q.to,
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: ProductCategory,
    pub unit: UnitOfMeasure,
    pub reorder_threshold: u32,
    pub pricing: Pricing,
    pub margin_percent: Option<f64>,
    pub status: ProductStatus,
    pub registered_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id_typed(),
            sku: p.sku().to_string(),
            name: p.name().to_string(),
            category: p.category(),
            unit: p.unit(),
            reorder_threshold: p.reorder_threshold(),
            pricing: p.pricing(),
            margin_percent: p.pricing().margin_percent(),
            status: p.status(),
            registered_at: p.registered_at(),
            version: p.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WarehouseResponse {
    pub id: WarehouseId,
    pub code: String,
    pub name: String,
    pub location: Location,
    pub status: WarehouseStatus,
    pub registered_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl From<&Warehouse> for WarehouseResponse {
    fn from(w: &Warehouse) -> Self {
        Self {
            id: w.id_typed(),
            code: w.code().to_string(),
            name: w.name().to_string(),
            location: w.location().clone(),
            status: w.status(),
            registered_at: w.registered_at(),
            version: w.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub order_id: Option<AggregateId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<&Reservation> for ReservationResponse {
    fn from(r: &Reservation) -> Self {
        let key = r.key();
        Self {
            id: r.id_typed(),
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity: r.quantity(),
            status: r.status(),
            order_id: r.order_id(),
            created_at: r.created_at(),
            expires_at: r.expires_at(),
            closed_at: r.closed_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: wms_orders::OrderId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub reservations: Vec<ReservationId>,
    pub rejection: Option<LineFailure>,
    pub fulfillment: Option<FulfillmentReport>,
    pub stock_released: bool,
    pub total_units: i64,
    pub shipped_units: i64,
    pub total_amount: u64,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id_typed(),
            status: o.status(),
            lines: o.lines().to_vec(),
            reservations: o.reservations().to_vec(),
            rejection: o.rejection().cloned(),
            fulfillment: o.fulfillment().cloned(),
            stock_released: o.stock_released(),
            total_units: o.total_units(),
            shipped_units: o.shipped_units(),
            total_amount: o.total_amount(),
            placed_at: o.placed_at(),
            updated_at: o.updated_at(),
        }
    }
}
