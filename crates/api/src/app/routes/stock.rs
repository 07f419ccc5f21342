use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_catalog::{ProductId, WarehouseId};
use wms_ledger::StockKey;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/receipts", post(receive_stock))
        .route("/adjustments", post(adjust_stock))
        .route("/:product_id/:warehouse_id", get(get_availability))
        .route("/:product_id/:warehouse_id/entries", get(list_entries))
        .route("/:product_id/:warehouse_id/audit", get(audit))
}

fn parse_key(product_id: &str, warehouse_id: &str) -> Result<StockKey, axum::response::Response> {
    let product_id: ProductId = errors::parse_id(product_id, "product")?;
    let warehouse_id: WarehouseId = errors::parse_id(warehouse_id, "warehouse")?;
    Ok(StockKey::new(product_id, warehouse_id))
}

pub async fn receive_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ReceiveStockRequest>,
) -> axum::response::Response {
    let key = StockKey::new(body.product_id, body.warehouse_id);
    match services
        .engine
        .ledger()
        .receive(key, body.quantity, body.reason)
        .await
    {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    match services
        .engine
        .adjust_stock(body.product_id, body.warehouse_id, body.delta, body.reason)
        .await
    {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, warehouse_id)): Path<(String, String)>,
) -> axum::response::Response {
    let key = match parse_key(&product_id, &warehouse_id) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match services.engine.availability(key).await {
        Ok(availability) => Json(availability).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, warehouse_id)): Path<(String, String)>,
) -> axum::response::Response {
    let key = match parse_key(&product_id, &warehouse_id) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match services.engine.ledger().entries(key).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn audit(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, warehouse_id)): Path<(String, String)>,
) -> axum::response::Response {
    let key = match parse_key(&product_id, &warehouse_id) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match services.engine.ledger().verify(key).await {
        Ok(audit) => Json(audit).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
